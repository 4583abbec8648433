//! Races command handlers for one request
//!
//! Every handler sees every request. A handler that does not own the command
//! returns [`Verdict::Declined`]; the first [`Verdict::Handled`] wins. Handlers
//! still running when a winner is found are detached, not cancelled, so their
//! side effects may still land. Failures are logged by the task that observed
//! them, also after a winner was picked; a panicking handler counts as failed.

use anyhow::anyhow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{CommandError, DispatchError, HandlerFailure};
use crate::registry::CommandDescriptor;
use crate::request::CommandRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Handled,
    Declined,
}

#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Commands this handler answers, for the catalog.
    fn describe(&self) -> Vec<CommandDescriptor>;

    async fn handle(&self, request: &CommandRequest) -> Result<Verdict, CommandError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Claimed { handler: String },
    Unclaimed,
}

pub struct CommandDispatcher {
    handlers: Vec<Arc<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new(handlers: Vec<Arc<dyn CommandHandler>>) -> Self {
        Self { handlers }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn dispatch(
        &self,
        request: Arc<CommandRequest>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (tx, mut rx) = mpsc::channel(self.handlers.len().max(1));

        for handler in &self.handlers {
            let name = handler.name().to_string();
            let command = request.command().to_string();
            let candidate = {
                let handler = Arc::clone(handler);
                let request = Arc::clone(&request);
                tokio::spawn(async move { handler.handle(&request).await })
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = match candidate.await {
                    Ok(result) => result,
                    Err(e) => Err(CommandError::Other(anyhow!("handler panicked: {}", e))),
                };
                // Reported here so failures after a winner was picked are not lost.
                if let Err(e) = &result {
                    error!(
                        handler = %name,
                        command = %command,
                        error = %e,
                        "command handler failed"
                    );
                }
                // The receiver is gone once a winner was picked.
                let _ = tx.send((name, result)).await;
            });
        }
        drop(tx);

        let mut failures = Vec::new();
        while let Some((handler, result)) = rx.recv().await {
            match result {
                Ok(Verdict::Handled) => {
                    debug!(handler = %handler, command = request.command(), "command claimed");
                    return Ok(DispatchOutcome::Claimed { handler });
                }
                Ok(Verdict::Declined) => {}
                Err(e) => failures.push(HandlerFailure { handler, error: e }),
            }
        }

        if failures.is_empty() {
            Ok(DispatchOutcome::Unclaimed)
        } else {
            Err(DispatchError {
                command: request.command().to_string(),
                failures,
            })
        }
    }
}
