use crate::AutomationError;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Holds the output of a shell command execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Turn a non-zero exit into [`AutomationError::CommandFailed`].
    pub fn ensure_success(self, command: &str) -> Result<Self, AutomationError> {
        if self.success() {
            Ok(self)
        } else {
            Err(AutomationError::CommandFailed {
                command: command.to_string(),
                exit_status: self.exit_status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs operating-system commands (package downloads, silent installers)
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput, AutomationError>;
}

/// Executes commands with `powershell -NoProfile -NonInteractive -Command`
#[derive(Debug, Clone)]
pub struct PowerShellRunner {
    program: String,
}

impl PowerShellRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PowerShellRunner {
    fn default() -> Self {
        Self::new("powershell")
    }
}

#[async_trait::async_trait]
impl CommandRunner for PowerShellRunner {
    #[instrument(level = "debug", skip(self, command), fields(program = %self.program))]
    async fn run(&self, command: &str) -> Result<CommandOutput, AutomationError> {
        debug!("running command: {}", command.trim());
        let output = tokio::process::Command::new(&self.program)
            .args(["-NoProfile", "-NonInteractive", "-Command", command])
            .output()
            .await
            .map_err(|e| {
                AutomationError::PlatformError(format!("Failed to start {}: {e}", self.program))
            })?;

        Ok(CommandOutput {
            exit_status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
