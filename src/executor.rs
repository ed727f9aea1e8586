//! Runs the OS command behind a power action.

use std::process::Command;
use tracing::{info, warn};

use crate::error::ActionError;
use crate::types::ActionKind;

/// Performs an irreversible system action.
///
/// Called from a blocking worker once the grace period has elapsed.
/// Failures are reported to the user, never retried.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, kind: ActionKind) -> Result<(), ActionError>;
}

/// Executor backed by the platform's power commands.
pub struct SystemExecutor {
    dry_run: bool,
}

impl SystemExecutor {
    pub fn new(dry_run: bool) -> Self {
        if dry_run {
            warn!("Dry-run mode: power actions will be logged, not executed");
        }
        Self { dry_run }
    }
}

impl ActionExecutor for SystemExecutor {
    fn execute(&self, kind: ActionKind) -> Result<(), ActionError> {
        let command_line = kind.command_line();

        if self.dry_run {
            info!(action = %kind, command = %command_line, "Dry run, skipping command");
            return Ok(());
        }

        info!(action = %kind, command = %command_line, "Running power command");

        let (program, args) = kind.command();
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| ActionError::Launch {
                command: command_line.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ActionError::CommandFailed {
                command: command_line,
                status: status.to_string(),
            })
        }
    }
}
