use crate::dispatch::{CommandHandler, Verdict};
use crate::error::CommandError;
use crate::markup::escape_markdown;
use crate::registry::CommandDescriptor;
use crate::request::CommandRequest;

use super::{framed, usage_error};

const COMMAND: &str = "echo";

pub struct EchoCommand {
    emoji: String,
}

impl EchoCommand {
    pub fn new(emoji: &str) -> Self {
        Self {
            emoji: emoji.to_string(),
        }
    }

    fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new(COMMAND, "echoes back what you say").with_parameter(
            "text",
            "text to echo back",
            true,
        )
    }
}

#[async_trait::async_trait]
impl CommandHandler for EchoCommand {
    fn name(&self) -> &str {
        COMMAND
    }

    fn describe(&self) -> Vec<CommandDescriptor> {
        vec![Self::descriptor()]
    }

    async fn handle(&self, request: &CommandRequest) -> Result<Verdict, CommandError> {
        if request.command() != COMMAND {
            return Ok(Verdict::Declined);
        }

        let text = request.param_string();
        if text.trim().is_empty() {
            request.reply(usage_error(&Self::descriptor())).await?;
            return Ok(Verdict::Handled);
        }

        let body = format!("Echo: {}", escape_markdown(&text));
        request.reply(framed(&self.emoji, &body)).await?;
        Ok(Verdict::Handled)
    }
}
