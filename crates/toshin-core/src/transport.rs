//! Narrow interfaces towards the chat transport

use anyhow::Result;
use toshin_ipc::EventBus;

use crate::reply::{InteractionReply, MessageReply};

/// The message a text-command reply is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTarget {
    pub channel_id: u64,
    pub message_id: u64,
}

/// The interaction token a slash-command reply is sent through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionTarget {
    pub interaction_id: u64,
    pub token: String,
    pub channel_id: u64,
}

/// Reference to a reply artifact the transport has created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHandle {
    pub channel_id: u64,
    pub message_id: u64,
    pub deletable: bool,
}

#[async_trait::async_trait]
pub trait ReplyTransport: Send + Sync {
    async fn send_message_reply(
        &self,
        target: &MessageTarget,
        reply: MessageReply,
    ) -> Result<ReplyHandle>;

    async fn edit_message(&self, handle: &ReplyHandle, reply: MessageReply)
        -> Result<ReplyHandle>;

    async fn delete_message(&self, handle: &ReplyHandle) -> Result<()>;

    async fn create_interaction_response(
        &self,
        target: &InteractionTarget,
        reply: InteractionReply,
    ) -> Result<ReplyHandle>;

    async fn defer_interaction(&self, target: &InteractionTarget) -> Result<()>;

    async fn edit_interaction_response(
        &self,
        target: &InteractionTarget,
        reply: InteractionReply,
    ) -> Result<ReplyHandle>;

    async fn delete_interaction_response(&self, target: &InteractionTarget) -> Result<()>;
}

/// A source of inbound triggers.
#[async_trait::async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel_name(&self) -> &str;
    async fn start(&self, event_bus: EventBus) -> Result<()>;
}
