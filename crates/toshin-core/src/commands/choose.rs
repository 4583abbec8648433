use rand::Rng;
use std::sync::Arc;
use toshin_ipc::Embed;

use crate::dispatch::{CommandHandler, Verdict};
use crate::error::CommandError;
use crate::markup::escape_markdown;
use crate::registry::CommandDescriptor;
use crate::reply::ReplyOptions;
use crate::request::{is_choice_command, CommandRequest};

use super::{usage_error, SharedRng};

const DESCRIPTION: &str = "randomly picks from a list of things";

pub struct ChooseCommand {
    emoji: String,
    rng: Arc<SharedRng>,
}

impl ChooseCommand {
    pub fn new(emoji: &str, rng: Arc<SharedRng>) -> Self {
        Self {
            emoji: emoji.to_string(),
            rng,
        }
    }

    fn descriptor(name: &str) -> CommandDescriptor {
        CommandDescriptor::new(name, DESCRIPTION).with_parameter(
            "choices",
            "choices to choose from, separated by ';'",
            true,
        )
    }
}

/// Numbered list of `choices` with the one at `picked` highlighted.
pub fn render_choices(emoji: &str, choices: &[String], picked: usize) -> String {
    let numbered = choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            let line = format!("{}. {}", i + 1, escape_markdown(choice));
            if i == picked {
                format!("**👉 {} 👈**", line)
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let heading = if emoji.is_empty() {
        "picks...".to_string()
    } else {
        format!("{} picks...", emoji)
    };
    format!("{}\n\n{}", heading, numbered)
}

#[async_trait::async_trait]
impl CommandHandler for ChooseCommand {
    fn name(&self) -> &str {
        "choose"
    }

    fn describe(&self) -> Vec<CommandDescriptor> {
        vec![Self::descriptor("choose"), Self::descriptor("choice")]
    }

    async fn handle(&self, request: &CommandRequest) -> Result<Verdict, CommandError> {
        if !is_choice_command(request.command()) {
            return Ok(Verdict::Declined);
        }

        let choices: Vec<String> = request
            .parameters()
            .values()
            .iter()
            .map(|choice| choice.trim().to_string())
            .filter(|choice| !choice.is_empty())
            .collect();

        if choices.is_empty() {
            request
                .reply(usage_error(&Self::descriptor(request.command())))
                .await?;
            return Ok(Verdict::Handled);
        }

        let picked = self.rng.with(|rng| rng.gen_range(0..choices.len()));
        let description = render_choices(&self.emoji, &choices, picked);
        request
            .reply(ReplyOptions::embed(Embed::description(description)))
            .await?;
        Ok(Verdict::Handled)
    }
}
