use std::sync::Arc;
use tracing::debug;

use crate::content::{ContentDefinition, ContentResolver};
use crate::dispatch::{CommandHandler, Verdict};
use crate::error::CommandError;
use crate::registry::CommandDescriptor;
use crate::request::CommandRequest;

use super::{usage_error, CommandContext, SharedRng};

/// Answers every command named in the emote table.
pub struct EmoteCommand {
    resolver: ContentResolver,
    emoji: String,
    rng: Arc<SharedRng>,
}

impl EmoteCommand {
    pub fn new(context: &CommandContext) -> Self {
        Self {
            resolver: ContentResolver::new(context.emotes.clone(), context.allowed_params.clone()),
            emoji: context.emoji.clone(),
            rng: context.rng.clone(),
        }
    }

    fn descriptor(name: &str, definition: &ContentDefinition) -> CommandDescriptor {
        if definition.is_replacement() {
            CommandDescriptor::new(name, format!("{} a friend", name)).with_parameter(
                "friend",
                format!("cool friend to {}", name),
                true,
            )
        } else {
            CommandDescriptor::new(name, name)
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for EmoteCommand {
    fn name(&self) -> &str {
        "emotes"
    }

    fn describe(&self) -> Vec<CommandDescriptor> {
        self.resolver
            .table()
            .iter()
            .map(|(name, definition)| Self::descriptor(name, definition))
            .collect()
    }

    async fn handle(&self, request: &CommandRequest) -> Result<Verdict, CommandError> {
        let command = request.command();
        let Some(definition) = self.resolver.table().get(command) else {
            return Ok(Verdict::Declined);
        };

        let param_string = request.param_string();
        if let ContentDefinition::Replacement {
            content,
            verify_params: false,
        } = definition
        {
            // One-fragment variants ignore the friend, anything else needs one.
            if param_string.trim().is_empty() && content.iter().any(|v| v.len() > 1) {
                request
                    .reply(usage_error(&Self::descriptor(command, definition)))
                    .await?;
                return Ok(Verdict::Handled);
            }
        }

        let resolved = self.rng.with(|rng| {
            self.resolver
                .resolve(command, &param_string, request.display_name(), rng)
        })?;

        let Some(resolved) = resolved else {
            debug!(command, "emote declined by verification gate");
            return Ok(Verdict::Declined);
        };

        request.reply(resolved.into_reply(&self.emoji)).await?;
        Ok(Verdict::Handled)
    }
}
