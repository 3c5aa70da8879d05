//! External command runner.
//!
//! Single execution layer for every OS utility the handlers drive. Captures
//! the real exit code and combined output without reinterpreting them; every
//! invocation is bounded by a timeout so a hung system utility cannot stall
//! the control loop.

use crate::error::ConvergeError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Maximum combined output captured per command.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Default bound on a single command's runtime.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Captured result of one command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, -1 when terminated by a signal.
    pub exit_code: i32,
    /// Combined stdout + stderr, truncated at [`MAX_OUTPUT_BYTES`].
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a command and capture its result regardless of exit status.
    pub async fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ConvergeError> {
        debug!("exec: {} {}", program, args.join(" "));
        let result = tokio::time::timeout(
            self.timeout,
            Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Err(_) => Err(ConvergeError::CommandTimeout(render(program, args))),
            Ok(Err(e)) => Err(ConvergeError::Io(e)),
            Ok(Ok(out)) => {
                let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&out.stderr));
                if combined.len() > MAX_OUTPUT_BYTES {
                    let mut cut = MAX_OUTPUT_BYTES;
                    while !combined.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    combined.truncate(cut);
                }
                Ok(CommandOutput {
                    exit_code: out.status.code().unwrap_or(-1),
                    output: combined,
                })
            }
        }
    }

    /// Run a command and fail on a non-zero exit, carrying the command line
    /// and its combined output in the error.
    pub async fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ConvergeError> {
        let out = self.output(program, args).await?;
        if !out.success() {
            return Err(ConvergeError::Command {
                command: render(program, args),
                code: out.exit_code,
                output: out.output.trim_end().to_string(),
            });
        }
        Ok(out)
    }

    /// Whether a systemd unit is currently active. Used to reload services
    /// that are already running without ever starting one that is not.
    pub async fn is_service_active(&self, unit: &str) -> bool {
        self.output("systemctl", &["is-active", unit])
            .await
            .map(|out| out.success())
            .unwrap_or(false)
    }
}

fn render(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
