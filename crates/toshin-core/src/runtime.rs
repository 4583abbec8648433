//! Event loop turning inbound envelopes into dispatched command requests

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use toshin_config::Config;
use toshin_ipc::{Envelope, Trigger};
use tracing::{debug, error, info, warn};

use crate::dispatch::{CommandDispatcher, DispatchOutcome};
use crate::error::RequestError;
use crate::registry::CommandRegistry;
use crate::request::{CommandRequest, RequestSettings};
use crate::transport::ReplyTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OtherGuild,
    BotAuthor,
    NotACommand,
}

/// What became of one envelope.
#[derive(Debug)]
pub enum Processed {
    Ignored(IgnoreReason),
    Rejected(RequestError),
    Dispatched(DispatchOutcome),
}

#[derive(Clone)]
pub struct BotRuntime {
    settings: Arc<RequestSettings>,
    guild_id: Option<u64>,
    dispatcher: Arc<CommandDispatcher>,
    transport: Arc<dyn ReplyTransport>,
}

impl BotRuntime {
    pub fn new(
        config: &Config,
        registry: CommandRegistry,
        transport: Arc<dyn ReplyTransport>,
    ) -> Self {
        Self {
            settings: Arc::new(RequestSettings::from(&config.bot)),
            guild_id: config.bot.guild_id,
            dispatcher: Arc::new(registry.into_dispatcher()),
            transport,
        }
    }

    /// Process envelopes until the bus closes, one task per envelope.
    /// In-flight tasks are awaited before returning.
    pub async fn run(&self, mut inbound_rx: broadcast::Receiver<Envelope>) -> Result<()> {
        info!(
            handlers = self.dispatcher.handler_count(),
            prefix = %self.settings.prefix,
            "Toshin runtime starting..."
        );

        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        loop {
            match inbound_rx.recv().await {
                Ok(envelope) => {
                    in_flight.retain(|handle| !handle.is_finished());
                    let runtime = self.clone();
                    in_flight.push(tokio::spawn(async move {
                        let trace_id = envelope.trace_id.clone();
                        if let Err(e) = runtime.process_envelope(envelope).await {
                            error!(trace_id = %trace_id, "Error processing command: {:#}", e);
                        }
                    }));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event bus closed, stopping command processor");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event bus lagged by {} triggers", n);
                }
            }
        }

        for handle in in_flight {
            if let Err(e) = handle.await {
                error!("Command task panicked: {}", e);
            }
        }
        Ok(())
    }

    pub async fn process_envelope(&self, envelope: Envelope) -> Result<Processed> {
        let trace_id = envelope.trace_id;
        let trigger = envelope.trigger;
        let kind = trigger.kind();

        if let Some(reason) = self.ignore_reason(&trigger) {
            debug!(trace_id = %trace_id, source = kind, reason = ?reason, "trigger ignored");
            return Ok(Processed::Ignored(reason));
        }

        let request =
            match CommandRequest::from_trigger(trigger, &self.settings, self.transport.clone()) {
                Ok(request) => Arc::new(request),
                Err(e) => {
                    warn!(trace_id = %trace_id, source = kind, "Dropping trigger: {}", e);
                    return Ok(Processed::Rejected(e));
                }
            };

        info!(
            trace_id = %trace_id,
            source = kind,
            command = request.command(),
            user = %request.user().username,
            "Processing command"
        );

        let outcome = self.dispatcher.dispatch(request.clone()).await?;
        match &outcome {
            DispatchOutcome::Claimed { handler } => {
                debug!(trace_id = %trace_id, command = request.command(), handler = %handler, "command handled");
            }
            DispatchOutcome::Unclaimed => {
                debug!(trace_id = %trace_id, command = request.command(), "no handler claimed command");
            }
        }
        Ok(Processed::Dispatched(outcome))
    }

    fn ignore_reason(&self, trigger: &Trigger) -> Option<IgnoreReason> {
        if let Some(expected) = self.guild_id {
            if trigger.guild_id() != Some(expected) {
                return Some(IgnoreReason::OtherGuild);
            }
        }

        match trigger {
            Trigger::Message { message } if message.author.bot => Some(IgnoreReason::BotAuthor),
            Trigger::Message { message } if !message.content.starts_with(&self.settings.prefix) => {
                Some(IgnoreReason::NotACommand)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{standard_registry, CommandContext, SharedRng};
    use crate::content::ContentTable;
    use crate::test_support::{interaction_trigger, message_trigger, RecordingTransport, WireCall};
    use toshin_ipc::EventBus;

    fn runtime(config: &Config, transport: &Arc<RecordingTransport>) -> BotRuntime {
        let emotes = ContentTable::from_json(
            r#"{"wave": {"type": "simple", "content": "waves"}}"#,
            "test",
        )
        .expect("table");
        let context = CommandContext {
            emoji: String::new(),
            allowed_params: String::new(),
            emotes: Arc::new(emotes),
            stickers: None,
            rng: Arc::new(SharedRng::seeded(1)),
        };
        let registry = standard_registry(&context).expect("registry");
        BotRuntime::new(config, registry, transport.clone())
    }

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.bot.quote_interactions = false;
        config
    }

    #[tokio::test]
    async fn dispatches_message_commands() {
        let transport = Arc::new(RecordingTransport::new());
        let runtime = runtime(&quiet_config(), &transport);

        let processed = runtime
            .process_envelope(Envelope::new("console", message_trigger("!ping")))
            .await
            .expect("processed");

        assert!(matches!(
            processed,
            Processed::Dispatched(DispatchOutcome::Claimed { ref handler }) if handler == "ping"
        ));
        assert_eq!(transport.calls()[0].content(), Some("pong"));
    }

    #[tokio::test]
    async fn ignores_messages_without_prefix_and_from_bots() {
        let transport = Arc::new(RecordingTransport::new());
        let runtime = runtime(&quiet_config(), &transport);

        let plain = runtime
            .process_envelope(Envelope::new("console", message_trigger("hello")))
            .await
            .expect("processed");
        assert!(matches!(plain, Processed::Ignored(IgnoreReason::NotACommand)));

        let mut from_bot = message_trigger("!ping");
        if let Trigger::Message { message } = &mut from_bot {
            message.author.bot = true;
        }
        let bot = runtime
            .process_envelope(Envelope::new("console", from_bot))
            .await
            .expect("processed");
        assert!(matches!(bot, Processed::Ignored(IgnoreReason::BotAuthor)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn guild_gate_drops_other_guilds() {
        let transport = Arc::new(RecordingTransport::new());
        let mut config = quiet_config();
        config.bot.guild_id = Some(999);
        let runtime = runtime(&config, &transport);

        let processed = runtime
            .process_envelope(Envelope::new("console", interaction_trigger("ping", &[])))
            .await
            .expect("processed");
        assert!(matches!(processed, Processed::Ignored(IgnoreReason::OtherGuild)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_channel_is_rejected_without_reply() {
        let transport = Arc::new(RecordingTransport::new());
        let runtime = runtime(&quiet_config(), &transport);

        let mut trigger = interaction_trigger("ping", &[]);
        if let Trigger::Interaction { interaction } = &mut trigger {
            interaction.channel_id = None;
        }
        let processed = runtime
            .process_envelope(Envelope::new("console", trigger))
            .await
            .expect("processed");
        assert!(matches!(
            processed,
            Processed::Rejected(RequestError::MissingChannel { .. })
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_commands_are_unclaimed() {
        let transport = Arc::new(RecordingTransport::new());
        let runtime = runtime(&quiet_config(), &transport);

        let processed = runtime
            .process_envelope(Envelope::new("console", message_trigger("!nothing")))
            .await
            .expect("processed");
        assert!(matches!(
            processed,
            Processed::Dispatched(DispatchOutcome::Unclaimed)
        ));
    }

    #[tokio::test]
    async fn interaction_replies_are_quoted_by_default() {
        let transport = Arc::new(RecordingTransport::new());
        let runtime = runtime(&Config::default(), &transport);

        runtime
            .process_envelope(Envelope::new(
                "console",
                interaction_trigger("echo", &["hi"]),
            ))
            .await
            .expect("processed");

        let calls = transport.calls();
        let WireCall::CreateInteraction { reply, .. } = &calls[0] else {
            panic!("expected an interaction response");
        };
        assert_eq!(reply.content.as_deref(), Some("> alice: echo hi"));
        assert_eq!(reply.embeds[0].description.as_deref(), Some("Echo: hi"));
    }

    #[tokio::test]
    async fn run_processes_until_bus_closes() {
        let transport = Arc::new(RecordingTransport::new());
        let runtime = runtime(&quiet_config(), &transport);
        let bus = EventBus::new();
        let inbound_rx = bus.subscribe();

        bus.publish(Envelope::new("console", message_trigger("!ping")))
            .expect("publish");
        bus.publish(Envelope::new("console", message_trigger("!wave")))
            .expect("publish");
        drop(bus);

        runtime.run(inbound_rx).await.expect("run");

        let mut contents: Vec<String> = transport
            .calls()
            .iter()
            .filter_map(|call| call.content().map(str::to_string))
            .collect();
        contents.sort();
        assert_eq!(contents, ["_waves_", "pong"]);
    }
}
