//! Built-in command handlers and the standard registry

mod choose;
mod dice;
mod echo;
mod emotes;
mod ping;
mod roll;
mod stickers;

pub use choose::{render_choices, ChooseCommand};
pub use dice::{render_roll, DiceCommand, DEFAULT_SIDES};
pub use echo::EchoCommand;
pub use emotes::EmoteCommand;
pub use ping::PingCommand;
pub use roll::{
    parse_expression, roll_expression, ExpressionError, RollCommand, RollResult, SignedTerm, Term,
};
pub use stickers::{StickerCommand, StickerTable};

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::{Arc, Mutex};
use toshin_config::Config;
use toshin_ipc::Embed;
use tracing::info;

use crate::content::ContentTable;
use crate::error::{ContentError, RegistryError};
use crate::registry::{CommandDescriptor, CommandRegistry};
use crate::reply::ReplyOptions;

/// Random source shared by handlers. Only locked inside synchronous helpers.
pub struct SharedRng(Mutex<StdRng>);

impl SharedRng {
    pub fn from_entropy() -> Self {
        Self(Mutex::new(StdRng::from_entropy()))
    }

    pub fn seeded(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }
}

impl std::fmt::Debug for SharedRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedRng")
    }
}

/// Tables and settings every built-in handler is built from.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub emoji: String,
    pub allowed_params: String,
    pub emotes: Arc<ContentTable>,
    pub stickers: Option<Arc<StickerTable>>,
    pub rng: Arc<SharedRng>,
}

impl CommandContext {
    /// Load content tables named by `config`, resolving relative paths
    /// against `base`.
    pub fn load(config: &Config, base: &Path) -> Result<Self, ContentError> {
        let emotes_path = config.emotes_path(base);
        let emotes = ContentTable::load(&emotes_path)?;
        info!(path = %emotes_path.display(), emotes = emotes.len(), "loaded emotes");

        let stickers = match config.stickers_path(base) {
            Some(path) => {
                let table = StickerTable::load(&path)?;
                info!(path = %path.display(), packs = table.len(), "loaded stickers");
                Some(Arc::new(table))
            }
            None => None,
        };

        Ok(Self {
            emoji: config.bot.emoji.clone(),
            allowed_params: config.content.allowed_params.clone(),
            emotes: Arc::new(emotes),
            stickers,
            rng: Arc::new(SharedRng::from_entropy()),
        })
    }
}

/// Registry with every built-in handler plus emotes and stickers.
pub fn standard_registry(context: &CommandContext) -> Result<CommandRegistry, RegistryError> {
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(EchoCommand::new(&context.emoji)))?;
    registry.register(Arc::new(PingCommand))?;
    registry.register(Arc::new(ChooseCommand::new(
        &context.emoji,
        context.rng.clone(),
    )))?;
    registry.register(Arc::new(DiceCommand::new(
        &context.emoji,
        context.rng.clone(),
    )))?;
    registry.register(Arc::new(RollCommand::new(
        &context.emoji,
        context.rng.clone(),
    )))?;
    if let Some(stickers) = &context.stickers {
        registry.register(Arc::new(StickerCommand::new(
            stickers.clone(),
            context.rng.clone(),
        )))?;
    }
    registry.register(Arc::new(EmoteCommand::new(context)))?;
    Ok(registry)
}

/// Embed reply whose description is led by the bot's emoji.
pub(crate) fn framed(emoji: &str, body: &str) -> ReplyOptions {
    let description = if emoji.is_empty() {
        body.to_string()
    } else {
        format!("{}\n\n{}", emoji, body)
    };
    ReplyOptions::embed(Embed::description(description))
}

pub(crate) fn usage_error(descriptor: &CommandDescriptor) -> ReplyOptions {
    let usage = match &descriptor.parameter {
        Some(parameter) if parameter.required => {
            format!("Usage: {} <{}>", descriptor.name, parameter.name)
        }
        Some(parameter) => format!("Usage: {} [{}]", descriptor.name, parameter.name),
        None => format!("Usage: {}", descriptor.name),
    };
    ReplyOptions::error(usage)
}
