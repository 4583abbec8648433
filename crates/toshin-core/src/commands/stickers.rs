//! Sticker packs: `!<pack>` for a random sticker, `!<pack> <name>` for one
//! sticker of the pack

use rand::seq::{IteratorRandom, SliceRandom};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use toshin_ipc::Embed;

use crate::content::ContentKind;
use crate::dispatch::{CommandHandler, Verdict};
use crate::error::{CommandError, ContentError};
use crate::registry::CommandDescriptor;
use crate::reply::ReplyOptions;
use crate::request::CommandRequest;

use super::SharedRng;

type StickerPack = BTreeMap<String, Vec<String>>;

/// Packs keyed by command name, stickers keyed by name, each with variants.
#[derive(Debug, Clone, Default)]
pub struct StickerTable {
    packs: BTreeMap<String, StickerPack>,
}

impl StickerTable {
    pub fn from_json(json: &str, origin: &str) -> Result<Self, ContentError> {
        let packs = serde_json::from_str(json).map_err(|source| ContentError::Parse {
            path: origin.to_string(),
            source,
        })?;
        Ok(Self { packs })
    }

    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let json = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json, &path.display().to_string())
    }

    pub fn pack(&self, name: &str) -> Option<&StickerPack> {
        self.packs.get(name)
    }

    pub fn pack_names(&self) -> impl Iterator<Item = &str> {
        self.packs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    pub fn validate(&self) -> Result<(), ContentError> {
        for (pack, stickers) in &self.packs {
            if stickers.is_empty() {
                return Err(ContentError::EmptyContent {
                    command: pack.clone(),
                });
            }
            if let Some((name, _)) = stickers.iter().find(|(_, variants)| variants.is_empty()) {
                return Err(ContentError::EmptyContent {
                    command: format!("{} {}", pack, name),
                });
            }
        }
        Ok(())
    }
}

/// What a sticker lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pick {
    Sticker { name: Option<String>, variant: String },
    Missing { name: String },
}

pub struct StickerCommand {
    table: Arc<StickerTable>,
    rng: Arc<SharedRng>,
}

impl StickerCommand {
    pub fn new(table: Arc<StickerTable>, rng: Arc<SharedRng>) -> Self {
        Self { table, rng }
    }

    fn pick(&self, pack_name: &str, pack: &StickerPack, requested: &str) -> Result<Pick, ContentError> {
        let empty = || ContentError::EmptyContent {
            command: pack_name.to_string(),
        };

        self.rng.with(|rng| {
            if requested.is_empty() {
                let (name, variants) = pack.iter().choose(rng).ok_or_else(empty)?;
                let variant = variants.choose(rng).ok_or_else(empty)?;
                return Ok(Pick::Sticker {
                    name: Some(name.clone()),
                    variant: variant.clone(),
                });
            }

            let Some(variants) = pack.get(requested) else {
                return Ok(Pick::Missing {
                    name: requested.to_string(),
                });
            };
            let variant = variants.choose(rng).ok_or_else(empty)?;
            Ok(Pick::Sticker {
                name: None,
                variant: variant.clone(),
            })
        })
    }
}

fn render(pack_name: &str, pick: Pick) -> ReplyOptions {
    match pick {
        Pick::Missing { name } => ReplyOptions::text(format!(
            "Cannot find sticker {} from pack {}!",
            name, pack_name
        )),
        Pick::Sticker { name, variant } => match ContentKind::detect(&variant) {
            ContentKind::Attachment => ReplyOptions::embed(Embed {
                description: name,
                image_url: Some(variant.trim().to_string()),
                colour: None,
            }),
            kind => {
                let text = match name {
                    Some(name) => format!("{}: {}", name, variant),
                    None => variant,
                };
                let options = ReplyOptions::text(text);
                if kind == ContentKind::Link {
                    options.unescaped()
                } else {
                    options
                }
            }
        },
    }
}

#[async_trait::async_trait]
impl CommandHandler for StickerCommand {
    fn name(&self) -> &str {
        "stickers"
    }

    fn describe(&self) -> Vec<CommandDescriptor> {
        self.table
            .pack_names()
            .map(|pack| {
                CommandDescriptor::new(pack, format!("stickers from {}", pack)).with_parameter(
                    "sticker",
                    "name of the sticker",
                    false,
                )
            })
            .collect()
    }

    async fn handle(&self, request: &CommandRequest) -> Result<Verdict, CommandError> {
        let Some(pack) = self.table.pack(request.command()) else {
            return Ok(Verdict::Declined);
        };

        let requested = request.param_string();
        let pick = self.pick(request.command(), pack, requested.trim())?;
        request.reply(render(request.command(), pick)).await?;
        Ok(Verdict::Handled)
    }
}
