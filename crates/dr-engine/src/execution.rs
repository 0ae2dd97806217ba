//! Boundary to the systems that actually fetch records and apply changes.

use thiserror::Error;

use crate::config::ActionDescriptor;
use crate::model::PropertyMap;

/// Output of a successful action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub mapped_records: Vec<PropertyMap>,
    pub command: String,
    pub response: String,
}

/// A failed action, with whatever command/response context was available.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub command: Option<String>,
    pub response: Option<String>,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            command: None,
            response: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }
}

/// Executes an action (REST call, shell command, ...) against a context map.
///
/// Implementations block the calling worker thread for the duration of the call.
pub trait ActionExecutor: Send + Sync {
    fn execute(
        &self,
        feature_pack_id: &str,
        action: &ActionDescriptor,
        context: &PropertyMap,
    ) -> Result<ExecutionResult, ExecutionError>;
}
