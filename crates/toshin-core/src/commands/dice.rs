use rand::Rng;
use std::sync::Arc;
use toshin_ipc::Embed;

use crate::dispatch::{CommandHandler, Verdict};
use crate::error::CommandError;
use crate::registry::CommandDescriptor;
use crate::reply::ReplyOptions;
use crate::request::CommandRequest;

use super::SharedRng;

const COMMAND: &str = "dice";
pub const DEFAULT_SIDES: u32 = 6;

pub struct DiceCommand {
    emoji: String,
    rng: Arc<SharedRng>,
}

impl DiceCommand {
    pub fn new(emoji: &str, rng: Arc<SharedRng>) -> Self {
        Self {
            emoji: emoji.to_string(),
            rng,
        }
    }
}

pub fn render_roll(emoji: &str, total: i64) -> String {
    let heading = if emoji.is_empty() {
        "rolls 🎲 ...".to_string()
    } else {
        format!("{} rolls 🎲 ...", emoji)
    };
    format!("{}\n\n**👉 {}! 👈**", heading, total)
}

fn parse_sides(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(DEFAULT_SIDES);
    }
    raw.parse::<u32>().ok().filter(|sides| *sides >= 1)
}

#[async_trait::async_trait]
impl CommandHandler for DiceCommand {
    fn name(&self) -> &str {
        COMMAND
    }

    fn describe(&self) -> Vec<CommandDescriptor> {
        vec![CommandDescriptor::new(COMMAND, "roll a die").with_parameter(
            "sides",
            "number of sides of the die",
            false,
        )]
    }

    async fn handle(&self, request: &CommandRequest) -> Result<Verdict, CommandError> {
        if request.command() != COMMAND {
            return Ok(Verdict::Declined);
        }

        let raw = request.param_string();
        let Some(sides) = parse_sides(&raw) else {
            request
                .reply(ReplyOptions::error(format!(
                    "{} is not a valid number of sides",
                    raw.trim()
                )))
                .await?;
            return Ok(Verdict::Handled);
        };

        let total = self.rng.with(|rng| rng.gen_range(1..=sides));
        let description = render_roll(&self.emoji, i64::from(total));
        request
            .reply(ReplyOptions::embed(Embed::description(description)))
            .await?;
        Ok(Verdict::Handled)
    }
}
