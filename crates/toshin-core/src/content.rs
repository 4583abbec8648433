//! Emote content tables and templated content resolution
//!
//! A content table maps command names to either a simple definition (one
//! fixed string or a set sampled uniformly) or a replacement definition whose
//! variants hold 1, 2 or 3 fragments. Fragment counts are checked when a
//! variant is substituted; [`ContentTable::validate`] checks them eagerly.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use toshin_ipc::Embed;
use url::Url;

use crate::error::ContentError;
use crate::markup::strip_zero_width;
use crate::reply::{ReplyOptions, WRAPPER_MARKER};

const VERSION_KEY: &str = "version";
const ATTACHMENT_SUFFIXES: [&str; 3] = [".gif", ".jpg", ".png"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimpleContent {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentDefinition {
    Simple {
        content: SimpleContent,
    },
    Replacement {
        content: Vec<Vec<String>>,
        #[serde(default, rename = "verifyParams")]
        verify_params: bool,
    },
}

impl ContentDefinition {
    pub fn is_replacement(&self) -> bool {
        matches!(self, ContentDefinition::Replacement { .. })
    }
}

/// Read-only table of content definitions keyed by command name.
#[derive(Debug, Clone, Default)]
pub struct ContentTable {
    entries: BTreeMap<String, ContentDefinition>,
}

impl ContentTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ContentDefinition)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Parse a JSON table. Any malformed entry fails the whole table.
    pub fn from_json(json: &str, origin: &str) -> Result<Self, ContentError> {
        let mut raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|source| ContentError::Parse {
                path: origin.to_string(),
                source,
            })?;
        raw.remove(VERSION_KEY);

        let mut entries = BTreeMap::new();
        for (name, value) in raw {
            let definition = serde_json::from_value(value).map_err(|source| {
                ContentError::Parse {
                    path: format!("{}#{}", origin, name),
                    source,
                }
            })?;
            entries.insert(name, definition);
        }

        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let json = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json, &path.display().to_string())
    }

    pub fn get(&self, command: &str) -> Option<&ContentDefinition> {
        self.entries.get(command)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContentDefinition)> {
        self.entries
            .iter()
            .map(|(name, definition)| (name.as_str(), definition))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every definition up front: non-empty content and legal
    /// fragment counts.
    pub fn validate(&self) -> Result<(), ContentError> {
        for (name, definition) in &self.entries {
            match definition {
                ContentDefinition::Simple {
                    content: SimpleContent::Many(values),
                } if values.is_empty() => {
                    return Err(ContentError::EmptyContent {
                        command: name.clone(),
                    })
                }
                ContentDefinition::Simple { .. } => {}
                ContentDefinition::Replacement { content, .. } => {
                    if content.is_empty() {
                        return Err(ContentError::EmptyContent {
                            command: name.clone(),
                        });
                    }
                    if let Some(variant) = content.iter().find(|v| !(1..=3).contains(&v.len())) {
                        return Err(ContentError::MalformedContent {
                            command: name.clone(),
                            fragments: variant.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Positional substitution of one replacement variant.
pub fn substitute(
    command: &str,
    variant: &[String],
    parameter: &str,
    display_name: &str,
) -> Result<String, ContentError> {
    match variant {
        [only] => Ok(only.clone()),
        [before, after] => Ok(format!("{}{}{}", before, parameter, after)),
        [before, middle, after] => Ok(format!(
            "{}{}{}{}{}",
            before, parameter, middle, display_name, after
        )),
        _ => Err(ContentError::MalformedContent {
            command: command.to_string(),
            fragments: variant.len(),
        }),
    }
}

/// How resolved text is handed to the reply layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Image URL, sent as an embedded image.
    Attachment,
    /// Any other URL, sent raw so the client previews it.
    Link,
    Text,
}

impl ContentKind {
    pub fn detect(text: &str) -> Self {
        let Ok(url) = Url::parse(text.trim()) else {
            return ContentKind::Text;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return ContentKind::Text;
        }
        let path = url.path().to_ascii_lowercase();
        if ATTACHMENT_SUFFIXES
            .iter()
            .any(|suffix| path.ends_with(suffix))
        {
            ContentKind::Attachment
        } else {
            ContentKind::Link
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub text: String,
    pub kind: ContentKind,
}

impl ResolvedContent {
    pub fn new(text: String) -> Self {
        let kind = ContentKind::detect(&text);
        Self { text, kind }
    }

    /// Reply options for this content, framing text with `emoji`.
    pub fn into_reply(self, emoji: &str) -> ReplyOptions {
        match self.kind {
            ContentKind::Attachment => ReplyOptions::embed(Embed::image(self.text.trim())),
            ContentKind::Link => ReplyOptions::text(self.text).unescaped(),
            ContentKind::Text => ReplyOptions::text(self.text)
                .unescaped()
                .wrapped(wrapper_for(emoji)),
        }
    }
}

/// Emphasis wrapper for templated text, led by the bot's emoji when set.
pub fn wrapper_for(emoji: &str) -> String {
    if emoji.is_empty() {
        format!("_{}_", WRAPPER_MARKER)
    } else {
        format!("_{}\n\n{}_", emoji, WRAPPER_MARKER)
    }
}

/// Resolves command names against a shared content table.
#[derive(Debug, Clone)]
pub struct ContentResolver {
    table: Arc<ContentTable>,
    allowed_params: String,
}

impl ContentResolver {
    pub fn new(table: Arc<ContentTable>, allowed_params: impl Into<String>) -> Self {
        Self {
            table,
            allowed_params: allowed_params.into(),
        }
    }

    pub fn table(&self) -> &ContentTable {
        &self.table
    }

    /// Returns `Ok(None)` when the command is not in the table or a
    /// verification gate rejects the parameter.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        command: &str,
        param_string: &str,
        display_name: &str,
        rng: &mut R,
    ) -> Result<Option<ResolvedContent>, ContentError> {
        let Some(definition) = self.table.get(command) else {
            return Ok(None);
        };

        let text = match definition {
            ContentDefinition::Simple {
                content: SimpleContent::One(text),
            } => text.clone(),
            ContentDefinition::Simple {
                content: SimpleContent::Many(values),
            } => values
                .choose(rng)
                .cloned()
                .ok_or_else(|| ContentError::EmptyContent {
                    command: command.to_string(),
                })?,
            ContentDefinition::Replacement {
                content,
                verify_params,
            } => {
                if *verify_params && strip_zero_width(param_string) != self.allowed_params {
                    return Ok(None);
                }
                let variant = content
                    .choose(rng)
                    .ok_or_else(|| ContentError::EmptyContent {
                        command: command.to_string(),
                    })?;
                substitute(command, variant, param_string, display_name)?
            }
        };

        Ok(Some(ResolvedContent::new(text)))
    }
}
