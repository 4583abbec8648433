//! Toshin Core
//!
//! Unified command requests, the reply lifecycle, emote content resolution
//! and handler dispatch

pub mod commands;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod markup;
pub mod registry;
pub mod reply;
pub mod request;
pub mod runtime;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use commands::{standard_registry, CommandContext, SharedRng, StickerTable};
pub use content::{ContentDefinition, ContentKind, ContentResolver, ContentTable, ResolvedContent};
pub use dispatch::{CommandDispatcher, CommandHandler, DispatchOutcome, Verdict};
pub use error::{
    CommandError, ContentError, DispatchError, HandlerFailure, RegistryError, ReplyError,
    RequestError,
};
pub use registry::{CommandDescriptor, CommandRegistry, RegistrationBatches};
pub use reply::{
    to_interaction_reply, to_message_reply, InteractionReply, MessageReply, ReplyController,
    ReplyOptions, ReplyState, ReplyStyle,
};
pub use request::{CommandRequest, ParameterSet, RequestSettings, Source};
pub use runtime::{BotRuntime, IgnoreReason, Processed};
pub use transport::{ChannelAdapter, InteractionTarget, MessageTarget, ReplyHandle, ReplyTransport};
