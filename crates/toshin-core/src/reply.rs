//! Reply options, wire conversion and the per-request reply lifecycle
//!
//! Handlers describe a reply once with [`ReplyOptions`]. The controller turns
//! it into the wire shape of the request's source and enforces that a request
//! is answered at most once, edited or deleted only after it was answered, and
//! deferred only before.

use std::sync::Arc;
use tokio::sync::Mutex;
use toshin_ipc::{Button, Embed, FileAttachment};
use tracing::debug;

use crate::error::ReplyError;
use crate::markup::escape_markdown;
use crate::transport::{InteractionTarget, MessageTarget, ReplyHandle, ReplyTransport};

/// Placeholder marker inside a wrapper string.
pub const WRAPPER_MARKER: char = '%';

/// Source-agnostic reply description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyOptions {
    pub content: Option<String>,
    /// `Some(false)` sends `content` verbatim; anything else escapes it.
    pub escape: Option<bool>,
    pub is_error: bool,
    pub mention_original_author: bool,
    pub wrapper_string: Option<String>,
    pub embeds: Vec<Embed>,
    pub files: Vec<FileAttachment>,
    pub components: Vec<Vec<Button>>,
}

impl ReplyOptions {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            is_error: true,
            ..Self::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }

    pub fn unescaped(mut self) -> Self {
        self.escape = Some(false);
        self
    }

    pub fn wrapped(mut self, wrapper: impl Into<String>) -> Self {
        self.wrapper_string = Some(wrapper.into());
        self
    }

    pub fn mentioning_author(mut self) -> Self {
        self.mention_original_author = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowedMentions {
    pub replied_user: bool,
}

/// Wire shape for replies to text messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageReply {
    pub content: Option<String>,
    pub allowed_mentions: AllowedMentions,
    pub embeds: Vec<Embed>,
    pub files: Vec<FileAttachment>,
    pub components: Vec<Vec<Button>>,
}

/// Wire shape for interaction responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionReply {
    pub content: Option<String>,
    pub ephemeral: bool,
    pub allowed_mentions: AllowedMentions,
    pub embeds: Vec<Embed>,
    pub files: Vec<FileAttachment>,
    pub components: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyStyle {
    pub error_marker: String,
}

impl Default for ReplyStyle {
    fn default() -> Self {
        Self {
            error_marker: "Error: ".to_string(),
        }
    }
}

/// Echo of the invocation shown above interaction responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationQuote {
    pub display_name: String,
    pub command: String,
    pub param_string: String,
}

impl InvocationQuote {
    fn render(&self) -> String {
        if self.param_string.is_empty() {
            format!("> {}: {}", self.display_name, self.command)
        } else {
            format!(
                "> {}: {} {}",
                self.display_name,
                self.command,
                escape_markdown(&self.param_string)
            )
        }
    }
}

/// Substitute `content` into a wrapper holding exactly one marker.
///
/// Returns `None` when the wrapper has no marker or more than one.
pub fn apply_wrapper(wrapper: &str, content: &str) -> Option<String> {
    let (before, after) = wrapper.split_once(WRAPPER_MARKER)?;
    if after.contains(WRAPPER_MARKER) {
        return None;
    }
    Some(format!("{}{}{}", before, content, after))
}

/// Escape, wrap and mark the free text of a reply.
pub fn render_content(options: &ReplyOptions, style: &ReplyStyle) -> Option<String> {
    let mut content = options.content.clone();

    if options.escape != Some(false) {
        content = content.map(|text| escape_markdown(&text));
    }

    if let Some(wrapper) = &options.wrapper_string {
        if let Some(wrapped) = apply_wrapper(wrapper, content.as_deref().unwrap_or("")) {
            content = Some(wrapped);
        }
    }

    if options.is_error {
        content = Some(format!(
            "{}{}",
            style.error_marker,
            content.unwrap_or_default()
        ));
    }

    content
}

pub fn to_message_reply(options: &ReplyOptions, style: &ReplyStyle) -> MessageReply {
    MessageReply {
        content: render_content(options, style),
        allowed_mentions: AllowedMentions {
            replied_user: options.mention_original_author,
        },
        embeds: options.embeds.clone(),
        files: options.files.clone(),
        components: options.components.clone(),
    }
}

pub fn to_interaction_reply(
    options: &ReplyOptions,
    style: &ReplyStyle,
    quote: Option<&InvocationQuote>,
) -> InteractionReply {
    let content = render_content(options, style);
    let content = match (quote, content) {
        (Some(quote), Some(text)) => Some(format!("{}\n\n{}", quote.render(), text)),
        (Some(quote), None) => Some(quote.render()),
        (None, content) => content,
    };

    InteractionReply {
        content,
        ephemeral: options.is_error,
        allowed_mentions: AllowedMentions {
            replied_user: options.mention_original_author,
        },
        embeds: options.embeds.clone(),
        files: options.files.clone(),
        components: options.components.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    NotReplied,
    Deferred,
    Replied,
    Edited,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReplyTarget {
    Message(MessageTarget),
    Interaction(InteractionTarget),
}

#[derive(Debug)]
struct Lifecycle {
    state: ReplyState,
    handle: Option<ReplyHandle>,
    errored: bool,
}

pub struct ReplyController {
    transport: Arc<dyn ReplyTransport>,
    target: ReplyTarget,
    style: ReplyStyle,
    lifecycle: Mutex<Lifecycle>,
}

impl ReplyController {
    pub(crate) fn new(
        transport: Arc<dyn ReplyTransport>,
        target: ReplyTarget,
        style: ReplyStyle,
    ) -> Self {
        Self {
            transport,
            target,
            style,
            lifecycle: Mutex::new(Lifecycle {
                state: ReplyState::NotReplied,
                handle: None,
                errored: false,
            }),
        }
    }

    pub async fn state(&self) -> ReplyState {
        self.lifecycle.lock().await.state
    }

    pub async fn handle(&self) -> Option<ReplyHandle> {
        self.lifecycle.lock().await.handle
    }

    /// Whether any reply sent so far was marked as an error.
    pub async fn has_errored(&self) -> bool {
        self.lifecycle.lock().await.errored
    }

    pub async fn reply(
        &self,
        options: &ReplyOptions,
        quote: Option<&InvocationQuote>,
    ) -> Result<(), ReplyError> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.reply_locked(&mut lifecycle, options, quote).await
    }

    pub async fn edit_reply(
        &self,
        options: &ReplyOptions,
        quote: Option<&InvocationQuote>,
    ) -> Result<(), ReplyError> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.edit_locked(&mut lifecycle, options, quote).await
    }

    /// Reply when nothing was sent yet, otherwise edit what was sent.
    pub async fn force_reply(
        &self,
        options: &ReplyOptions,
        quote: Option<&InvocationQuote>,
    ) -> Result<(), ReplyError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == ReplyState::NotReplied {
            self.reply_locked(&mut lifecycle, options, quote).await
        } else {
            self.edit_locked(&mut lifecycle, options, quote).await
        }
    }

    pub async fn delete_reply(&self) -> Result<(), ReplyError> {
        let mut lifecycle = self.lifecycle.lock().await;

        let handle = match (lifecycle.state, lifecycle.handle) {
            (ReplyState::Replied | ReplyState::Edited, Some(handle)) if handle.deletable => handle,
            _ => return Err(ReplyError::NotDeletable),
        };

        let deleted = match &self.target {
            ReplyTarget::Message(_) => self.transport.delete_message(&handle).await,
            ReplyTarget::Interaction(target) => {
                self.transport.delete_interaction_response(target).await
            }
        };
        deleted.map_err(ReplyError::Transport)?;

        debug!(message_id = handle.message_id, "reply deleted");
        lifecycle.state = ReplyState::Deleted;
        lifecycle.handle = None;
        Ok(())
    }

    /// Acknowledge an interaction now and answer later. No-op for messages
    /// and for requests that already left `NotReplied`.
    pub async fn defer_reply(&self) -> Result<(), ReplyError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != ReplyState::NotReplied {
            return Ok(());
        }

        let ReplyTarget::Interaction(target) = &self.target else {
            return Ok(());
        };

        self.transport
            .defer_interaction(target)
            .await
            .map_err(ReplyError::Transport)?;

        debug!(interaction_id = target.interaction_id, "reply deferred");
        lifecycle.state = ReplyState::Deferred;
        Ok(())
    }

    async fn reply_locked(
        &self,
        lifecycle: &mut Lifecycle,
        options: &ReplyOptions,
        quote: Option<&InvocationQuote>,
    ) -> Result<(), ReplyError> {
        let handle = match lifecycle.state {
            ReplyState::NotReplied => self.send_initial(options, quote).await?,
            // The first reply after a deferral fills in the pending response.
            ReplyState::Deferred => self.send_edit(lifecycle.handle, options, quote).await?,
            ReplyState::Replied | ReplyState::Edited | ReplyState::Deleted => {
                return Err(ReplyError::AlreadyReplied)
            }
        };

        debug!(message_id = handle.message_id, "reply sent");
        lifecycle.state = ReplyState::Replied;
        lifecycle.handle = Some(handle);
        lifecycle.errored |= options.is_error;
        Ok(())
    }

    async fn edit_locked(
        &self,
        lifecycle: &mut Lifecycle,
        options: &ReplyOptions,
        quote: Option<&InvocationQuote>,
    ) -> Result<(), ReplyError> {
        match lifecycle.state {
            ReplyState::NotReplied => return Err(ReplyError::NotYetReplied),
            ReplyState::Deleted => return Err(ReplyError::Deleted),
            ReplyState::Deferred | ReplyState::Replied | ReplyState::Edited => {}
        }

        let handle = self.send_edit(lifecycle.handle, options, quote).await?;

        debug!(message_id = handle.message_id, "reply edited");
        lifecycle.state = ReplyState::Edited;
        lifecycle.handle = Some(handle);
        lifecycle.errored |= options.is_error;
        Ok(())
    }

    async fn send_initial(
        &self,
        options: &ReplyOptions,
        quote: Option<&InvocationQuote>,
    ) -> Result<ReplyHandle, ReplyError> {
        let sent = match &self.target {
            ReplyTarget::Message(target) => {
                self.transport
                    .send_message_reply(target, to_message_reply(options, &self.style))
                    .await
            }
            ReplyTarget::Interaction(target) => {
                self.transport
                    .create_interaction_response(
                        target,
                        to_interaction_reply(options, &self.style, quote),
                    )
                    .await
            }
        };
        sent.map_err(ReplyError::Transport)
    }

    async fn send_edit(
        &self,
        handle: Option<ReplyHandle>,
        options: &ReplyOptions,
        quote: Option<&InvocationQuote>,
    ) -> Result<ReplyHandle, ReplyError> {
        let edited = match &self.target {
            ReplyTarget::Message(_) => {
                let handle = handle.ok_or(ReplyError::NotYetReplied)?;
                self.transport
                    .edit_message(&handle, to_message_reply(options, &self.style))
                    .await
            }
            ReplyTarget::Interaction(target) => {
                self.transport
                    .edit_interaction_response(
                        target,
                        to_interaction_reply(options, &self.style, quote),
                    )
                    .await
            }
        };
        edited.map_err(ReplyError::Transport)
    }
}
