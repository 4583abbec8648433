use crate::dispatch::{CommandHandler, Verdict};
use crate::error::CommandError;
use crate::registry::CommandDescriptor;
use crate::reply::ReplyOptions;
use crate::request::CommandRequest;

const COMMAND: &str = "ping";

pub struct PingCommand;

#[async_trait::async_trait]
impl CommandHandler for PingCommand {
    fn name(&self) -> &str {
        COMMAND
    }

    fn describe(&self) -> Vec<CommandDescriptor> {
        vec![CommandDescriptor::new(COMMAND, "pongs back")]
    }

    async fn handle(&self, request: &CommandRequest) -> Result<Verdict, CommandError> {
        if request.command() != COMMAND {
            return Ok(Verdict::Declined);
        }
        request.reply(ReplyOptions::text("pong")).await?;
        Ok(Verdict::Handled)
    }
}
