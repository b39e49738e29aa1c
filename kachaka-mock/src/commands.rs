//! Command simulation.
//!
//! A started command is `Running` for the configured duration. A background
//! task then records a successful result, appends it to the history and
//! reports the robot `Pending` again, in that order, so a client that sees
//! `Pending` can read the result straight away. All three writes happen
//! while the command-state store is locked; lock order is command state
//! first, then the other stores.

use kachaka_core::CursorStore;
use kachaka_types::{
    Command, CommandResult, CommandState, CommandStatus, History, LastCommandResult,
    StartCommandRequest,
};
use std::sync::Arc;
use std::time::Duration;

/// `MoveShelf` without a shelf.
pub const ERROR_MISSING_SHELF: i32 = 10250;
/// `MoveShelf` without a destination.
pub const ERROR_MISSING_DESTINATION: i32 = 10251;

/// The stores a finishing command writes.
#[derive(Clone)]
pub struct CommandStores {
    /// Command execution state.
    pub command_state: Arc<CursorStore<CommandStatus>>,
    /// Result of the last finished command.
    pub last_command_result: Arc<CursorStore<LastCommandResult>>,
    /// Finished commands, oldest first.
    pub history_list: Arc<CursorStore<Vec<History>>>,
}

impl CommandStores {
    /// Append a finished command to the history.
    pub fn record(&self, command_id: &str, request: &StartCommandRequest, result: CommandResult) {
        self.history_list.update(|list| {
            list.push(History {
                id: command_id.to_string(),
                command: request.command.clone(),
                success: result.success,
                error_code: result.error_code,
                title: request.title.clone(),
            })
        });
    }
}

/// Check a command's arguments, returning the robot's error code on failure.
pub fn validate(command: &Command) -> Result<(), i32> {
    match command {
        Command::MoveShelf {
            target_shelf_id,
            destination_location_id,
        } => {
            if target_shelf_id.is_empty() {
                return Err(ERROR_MISSING_SHELF);
            }
            if destination_location_id.is_empty() {
                return Err(ERROR_MISSING_DESTINATION);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Spawn the task that finishes command `command_id` after `duration`.
///
/// Does nothing if another command has started in the meantime.
pub fn spawn_completion(
    stores: CommandStores,
    command_id: String,
    request: StartCommandRequest,
    duration: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;

        // The result is recorded under the command-state lock, so a command
        // started concurrently cannot be overwritten by this one finishing.
        let finished = stores.command_state.update_if(|current| {
            if current.command_id.as_deref() != Some(command_id.as_str()) {
                return None;
            }
            stores.last_command_result.write(LastCommandResult {
                result: CommandResult::ok(),
                command: Some(request.command.clone()),
            });
            stores.record(&command_id, &request, CommandResult::ok());
            Some(CommandStatus {
                state: CommandState::Pending,
                command: None,
                command_id: None,
            })
        });

        match finished {
            Some(_) => tracing::info!(%command_id, "command finished"),
            None => tracing::debug!(%command_id, "command superseded before completion"),
        }
    })
}
