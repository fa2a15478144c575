//! STDIO transport for MCP servers
//!
//! Handles connecting to MCP servers that run as child processes
//! communicating over stdin/stdout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use skillmux_core::expand::{expand_env_vars, expand_map_values};
use skillmux_core::{ClientIdentity, McpError, McpResult, TransportType};
use tokio::process::Command;
use tracing::{debug, error, info};

use super::env::sanitized_process_env;
use super::Transport;
use crate::pool::instance::{McpClientHandler, McpConnection, RmcpConnection};

/// Apply platform-specific isolation to a server child process.
///
/// Unix: the child gets its own process group, so a terminal Ctrl-C reaches
/// only the host, which then closes its servers itself.
/// Windows: `CREATE_NO_WINDOW` keeps console servers from flashing a window.
pub fn configure_child_process_platform(cmd: &mut Command) {
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
}

/// STDIO transport for child process MCP servers
pub struct StdioTransport {
    identity: ClientIdentity,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    handler: McpClientHandler,
    connect_timeout: Duration,
    close_timeout: Duration,
}

impl StdioTransport {
    pub fn new(
        identity: ClientIdentity,
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        handler: McpClientHandler,
        connect_timeout: Duration,
        close_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            command,
            args,
            env,
            handler,
            connect_timeout,
            close_timeout,
        }
    }

    /// Split a command with embedded arguments (`"npx -y pkg"`) when no
    /// separate `args` were given.
    fn parse_command(&self) -> McpResult<(String, Vec<String>)> {
        if !self.args.is_empty() || !self.command.contains(' ') {
            return Ok((self.command.trim().to_string(), self.args.clone()));
        }

        let parts = shell_words::split(&self.command).map_err(|e| {
            McpError::Configuration(format!(
                "Failed to parse command for MCP server \"{}\" in skill \"{}\": {} \
                 (check for unmatched quotes in \"{}\")",
                self.identity.server_name, self.identity.skill_name, e, self.command
            ))
        })?;

        let mut parts = parts.into_iter();
        let executable = parts.next().unwrap_or_default();
        Ok((executable, parts.collect()))
    }

    /// Resolve the executable against the PATH the child will see.
    fn resolve_executable(
        &self,
        executable: &str,
        env: &HashMap<String, String>,
    ) -> Result<PathBuf, which::Error> {
        match env.get("PATH") {
            Some(path) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(executable, Some(path), cwd)
            }
            None => which::which(executable),
        }
    }

    fn connection_error(&self, command_line: &str, cause: impl std::fmt::Display) -> McpError {
        McpError::Connection(format!(
            "Failed to connect to MCP server \"{}\" (skill \"{}\").\n\
             Command: {}\n\
             Reason: {}\n\
             \n\
             Hints:\n\
             - Make sure the command is installed and on PATH\n\
             - If it launches a package (npx, uvx, ...), check that the package name exists\n\
             - Run the command by hand to see its output",
            self.identity.server_name, self.identity.skill_name, command_line, cause
        ))
    }
}

fn command_line(executable: &str, args: &[String]) -> String {
    if args.is_empty() {
        executable.to_string()
    } else {
        format!("{} {}", executable, args.join(" "))
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> McpResult<Arc<dyn McpConnection>> {
        if self.command.trim().is_empty() {
            return Err(McpError::Configuration(format!(
                "MCP server \"{}\" in skill \"{}\" is configured for stdio but has no \"command\"",
                self.identity.server_name, self.identity.skill_name
            )));
        }

        let (executable, args) = self.parse_command()?;
        if executable.is_empty() {
            return Err(McpError::Configuration(format!(
                "MCP server \"{}\" in skill \"{}\" has an empty command after parsing",
                self.identity.server_name, self.identity.skill_name
            )));
        }

        let args: Vec<String> = args.iter().map(|a| expand_env_vars(a)).collect();
        let env = sanitized_process_env(&expand_map_values(&self.env));
        let line = command_line(&executable, &args);

        info!(
            pool_key = %self.identity.pool_key(),
            command = %line,
            "[StdioTransport] Connecting to STDIO server"
        );

        let command_path = match self.resolve_executable(&executable, &env) {
            Ok(path) => path,
            Err(e) => {
                error!(
                    server = %self.identity.server_name,
                    command = %executable,
                    "[StdioTransport] Command not found"
                );
                return Err(self.connection_error(&line, format!("command not found ({})", e)));
            }
        };

        debug!(
            server = %self.identity.server_name,
            path = ?command_path,
            env_count = env.len(),
            "[StdioTransport] Found command"
        );

        let spawn_args = args.clone();
        let transport = TokioChildProcess::new(Command::new(&command_path).configure(move |cmd| {
            cmd.args(&spawn_args)
                .env_clear()
                .envs(&env)
                .stderr(Stdio::null())
                .kill_on_drop(true);
            configure_child_process_platform(cmd);
        }))
        .map_err(|e| {
            error!(server = %self.identity.server_name, error = %e, "[StdioTransport] Spawn failed");
            self.connection_error(&line, format!("failed to spawn process: {}", e))
        })?;

        // A failed or abandoned handshake drops the transport, and kill_on_drop
        // reaps the child.
        let client = match tokio::time::timeout(
            self.connect_timeout,
            self.handler.clone().serve(transport),
        )
        .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                error!(server = %self.identity.server_name, error = %e, "[StdioTransport] MCP handshake failed");
                return Err(self.connection_error(&line, format!("MCP handshake failed: {}", e)));
            }
            Err(_) => {
                error!(
                    server = %self.identity.server_name,
                    timeout = ?self.connect_timeout,
                    "[StdioTransport] MCP handshake timed out"
                );
                return Err(self.connection_error(
                    &line,
                    format!("MCP handshake timed out after {:?}", self.connect_timeout),
                ));
            }
        };

        info!(
            pool_key = %self.identity.pool_key(),
            "[StdioTransport] STDIO server connected"
        );

        Ok(Arc::new(RmcpConnection::new(
            self.identity.server_name.clone(),
            TransportType::Stdio,
            client,
            self.close_timeout,
        )))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn description(&self) -> String {
        format!("stdio:{}", command_line(&self.command, &self.args))
    }
}
