//! Child environment for stdio servers
//!
//! Stdio servers are usually launched through `npx`, `pnpm dlx` or `yarn dlx`.
//! When the host itself runs under a package manager, its `npm_config_*` and
//! friends leak into the child and change how the launcher resolves the
//! server package (prefix, registry, workspace root). Those variables are
//! stripped before spawn, from the inherited set and from overrides alike.

use std::collections::HashMap;

use tracing::{debug, warn};

/// Exact names that are always removed
const FILTERED_EXACT: &[&str] = &["NO_UPDATE_NOTIFIER"];

/// Whether `name` must not reach a spawned server.
///
/// `NPM_CONFIG_` is matched case-insensitively because npm itself exports the
/// lowercase `npm_config_*` form.
pub fn is_filtered_env_var(name: &str) -> bool {
    if name.to_ascii_uppercase().starts_with("NPM_CONFIG_") {
        return true;
    }
    if name.starts_with("YARN_") || name.starts_with("PNPM_") {
        return true;
    }
    FILTERED_EXACT.contains(&name)
}

/// Build the full environment for a child process.
///
/// `ambient` is the host environment (normally `std::env::vars()`); the result
/// is the filtered ambient set overlaid with the filtered `overrides`.
pub fn build_spawn_env<I>(ambient: I, overrides: &HashMap<String, String>) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut dropped = 0usize;
    let mut env: HashMap<String, String> = ambient
        .into_iter()
        .filter(|(name, _)| {
            let keep = !is_filtered_env_var(name);
            if !keep {
                dropped += 1;
            }
            keep
        })
        .collect();

    for (name, value) in overrides {
        if is_filtered_env_var(name) {
            warn!(
                variable = %name,
                "[StdioTransport] Ignoring package-manager variable in server env"
            );
            continue;
        }
        env.insert(name.clone(), value.clone());
    }

    if dropped > 0 {
        debug!(
            dropped,
            "[StdioTransport] Filtered package-manager variables from child environment"
        );
    }
    env
}

/// [`build_spawn_env`] over the current process environment.
pub fn sanitized_process_env(overrides: &HashMap<String, String>) -> HashMap<String, String> {
    build_spawn_env(std::env::vars(), overrides)
}
