//! Environment placeholder expansion
//!
//! Skill manifests reference secrets through `${VAR}` or `${env:VAR}` rather
//! than inlining them. Placeholders whose variable is unset are left verbatim
//! so the server sees an obviously-unresolved value instead of an empty one.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::warn;

lazy_static! {
    static ref ENV_PLACEHOLDER: Regex =
        Regex::new(r"\$\{(?:env:)?([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Expand placeholders using the current process environment.
pub fn expand_env_vars(template: &str) -> String {
    expand_with(template, |name| std::env::var(name).ok())
}

/// Expand placeholders using a caller-supplied lookup.
pub fn expand_with<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => {
                    warn!(variable = %name, "[EnvExpand] Unresolved environment placeholder left as-is");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Expand every value of a map.
pub fn expand_map_values(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}
