//! Error types for request construction, replies, content and dispatch

use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning a trigger into a [`crate::CommandRequest`].
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("interaction {interaction_id} does not have a channel")]
    MissingChannel { interaction_id: u64 },

    #[error("message does not start with the command prefix {prefix:?}")]
    MissingPrefix { prefix: String },

    #[error("message contains a prefix but no command")]
    EmptyCommand,
}

/// Reply lifecycle violations and transport failures.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("this command has already been replied")]
    AlreadyReplied,

    #[error("this command has not been replied, thus the reply cannot be edited")]
    NotYetReplied,

    #[error("this command has not been replied or the reply is not deletable")]
    NotDeletable,

    #[error("the reply to this command has been deleted")]
    Deleted,

    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(
        "a variant in replacement content of \"{command}\" has {fragments} fragments, expected 1, 2 or 3"
    )]
    MalformedContent { command: String, fragments: usize },

    #[error("content of \"{command}\" has nothing to choose from")]
    EmptyContent { command: String },

    #[error("failed to read content file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("content file {path} is malformed")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("command \"{command}\" is claimed by both {first} and {second}")]
    DuplicateCommand {
        command: String,
        first: String,
        second: String,
    },

    #[error("command \"{command}\" from {handler} must be lowercase and without whitespace")]
    InvalidName { command: String, handler: String },

    #[error("command list length larger than {limit} ({count})")]
    TooManyCommands { count: usize, limit: usize },
}

/// A genuine handler failure, as opposed to a decline.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: CommandError,
}

/// Every candidate declined or failed, and at least one failed.
#[derive(Debug, Error)]
#[error("{count} handler(s) failed while executing command \"{command}\"", count = .failures.len())]
pub struct DispatchError {
    pub command: String,
    pub failures: Vec<HandlerFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_content_names_command() {
        let err = ContentError::MalformedContent {
            command: "hug".to_string(),
            fragments: 4,
        };
        assert_eq!(
            err.to_string(),
            "a variant in replacement content of \"hug\" has 4 fragments, expected 1, 2 or 3"
        );
    }

    #[test]
    fn dispatch_error_counts_failures() {
        let err = DispatchError {
            command: "echo".to_string(),
            failures: vec![HandlerFailure {
                handler: "echo".to_string(),
                error: CommandError::Reply(ReplyError::AlreadyReplied),
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 handler(s) failed while executing command \"echo\""
        );
    }

    #[test]
    fn command_error_is_transparent() {
        let err: CommandError = ReplyError::NotYetReplied.into();
        assert_eq!(err.to_string(), ReplyError::NotYetReplied.to_string());
    }
}
