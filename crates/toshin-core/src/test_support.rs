//! Recording transport and trigger builders shared by unit tests

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use toshin_ipc::{InboundInteraction, InboundMessage, InteractionOption, Trigger, User};

use crate::reply::{InteractionReply, MessageReply};
use crate::request::{CommandRequest, RequestSettings};
use crate::transport::{InteractionTarget, MessageTarget, ReplyHandle, ReplyTransport};

#[derive(Debug, Clone, PartialEq)]
pub enum WireCall {
    SendMessage {
        target: MessageTarget,
        reply: MessageReply,
    },
    EditMessage {
        handle: ReplyHandle,
        reply: MessageReply,
    },
    DeleteMessage {
        handle: ReplyHandle,
    },
    CreateInteraction {
        target: InteractionTarget,
        reply: InteractionReply,
    },
    DeferInteraction {
        target: InteractionTarget,
    },
    EditInteraction {
        target: InteractionTarget,
        reply: InteractionReply,
    },
    DeleteInteraction {
        target: InteractionTarget,
    },
}

impl WireCall {
    /// Text content carried by a send or edit call.
    pub fn content(&self) -> Option<&str> {
        match self {
            WireCall::SendMessage { reply, .. } | WireCall::EditMessage { reply, .. } => {
                reply.content.as_deref()
            }
            WireCall::CreateInteraction { reply, .. } | WireCall::EditInteraction { reply, .. } => {
                reply.content.as_deref()
            }
            _ => None,
        }
    }
}

pub struct RecordingTransport {
    calls: Mutex<Vec<WireCall>>,
    next_id: AtomicU64,
    deletable: bool,
    fail_next: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
            deletable: true,
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn with_deletable(mut self, deletable: bool) -> Self {
        self.deletable = deletable;
        self
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<WireCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: WireCall) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("simulated transport failure"));
        }
        self.calls.lock().expect("calls lock").push(call);
        Ok(())
    }

    fn handle(&self, channel_id: u64) -> ReplyHandle {
        ReplyHandle {
            channel_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            deletable: self.deletable,
        }
    }
}

#[async_trait::async_trait]
impl ReplyTransport for RecordingTransport {
    async fn send_message_reply(
        &self,
        target: &MessageTarget,
        reply: MessageReply,
    ) -> Result<ReplyHandle> {
        self.record(WireCall::SendMessage {
            target: *target,
            reply,
        })?;
        Ok(self.handle(target.channel_id))
    }

    async fn edit_message(
        &self,
        handle: &ReplyHandle,
        reply: MessageReply,
    ) -> Result<ReplyHandle> {
        self.record(WireCall::EditMessage {
            handle: *handle,
            reply,
        })?;
        Ok(*handle)
    }

    async fn delete_message(&self, handle: &ReplyHandle) -> Result<()> {
        self.record(WireCall::DeleteMessage { handle: *handle })
    }

    async fn create_interaction_response(
        &self,
        target: &InteractionTarget,
        reply: InteractionReply,
    ) -> Result<ReplyHandle> {
        self.record(WireCall::CreateInteraction {
            target: target.clone(),
            reply,
        })?;
        Ok(self.handle(target.channel_id))
    }

    async fn defer_interaction(&self, target: &InteractionTarget) -> Result<()> {
        self.record(WireCall::DeferInteraction {
            target: target.clone(),
        })
    }

    async fn edit_interaction_response(
        &self,
        target: &InteractionTarget,
        reply: InteractionReply,
    ) -> Result<ReplyHandle> {
        self.record(WireCall::EditInteraction {
            target: target.clone(),
            reply,
        })?;
        Ok(self.handle(target.channel_id))
    }

    async fn delete_interaction_response(&self, target: &InteractionTarget) -> Result<()> {
        self.record(WireCall::DeleteInteraction {
            target: target.clone(),
        })
    }
}

pub fn user(username: &str) -> User {
    User {
        id: 7,
        username: username.to_string(),
        bot: false,
    }
}

pub fn message_trigger(content: &str) -> Trigger {
    Trigger::Message {
        message: InboundMessage {
            id: 1,
            channel_id: 10,
            guild_id: Some(100),
            content: content.to_string(),
            author: user("alice"),
            nickname: None,
            mentions: HashMap::new(),
        },
    }
}

pub fn interaction_trigger(command: &str, values: &[&str]) -> Trigger {
    Trigger::Interaction {
        interaction: InboundInteraction {
            id: 5,
            token: "tok".to_string(),
            command_name: command.to_string(),
            channel_id: Some(10),
            guild_id: Some(100),
            user: user("alice"),
            nickname: None,
            options: values
                .iter()
                .enumerate()
                .map(|(i, value)| InteractionOption::new(&format!("option{}", i + 1), *value))
                .collect(),
            mentions: HashMap::new(),
        },
    }
}

pub fn settings() -> RequestSettings {
    RequestSettings {
        quote_interactions: false,
        ..RequestSettings::default()
    }
}

/// Build a request from a trigger with quoting disabled.
pub fn request(trigger: Trigger, transport: &Arc<RecordingTransport>) -> Arc<CommandRequest> {
    Arc::new(
        CommandRequest::from_trigger(trigger, &settings(), transport.clone())
            .expect("valid trigger"),
    )
}

/// Formatted tracing output captured for the current thread.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route events on this thread here until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("logs lock")).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("logs lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
