//! Unified command request built from either trigger source

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use toshin_config::BotConfig;
use toshin_ipc::{InboundInteraction, InboundMessage, Trigger, User};

use crate::error::{ReplyError, RequestError};
use crate::markup::{escape_markdown, sanitize_mentions};
use crate::reply::{
    InvocationQuote, ReplyController, ReplyOptions, ReplyState, ReplyStyle, ReplyTarget,
};
use crate::transport::{InteractionTarget, MessageTarget, ReplyTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Message,
    Interaction,
}

/// Commands whose parameters are a `;`-separated list of choices.
pub fn is_choice_command(command: &str) -> bool {
    command == "choose" || command == "choice"
}

pub fn separator_for(command: &str) -> char {
    if is_choice_command(command) {
        ';'
    } else {
        ' '
    }
}

/// Ordered parameters plus the raw string they were split from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    values: Vec<String>,
    raw: String,
    separator: char,
}

impl ParameterSet {
    pub fn parse(raw: &str, separator: char) -> Self {
        let values = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split(separator).map(str::to_string).collect()
        };
        Self {
            values,
            raw: raw.to_string(),
            separator,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Construction settings shared by every request of a bot.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub prefix: String,
    pub quote_interactions: bool,
    pub style: ReplyStyle,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            quote_interactions: true,
            style: ReplyStyle::default(),
        }
    }
}

impl From<&BotConfig> for RequestSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            quote_interactions: config.quote_interactions,
            style: ReplyStyle {
                error_marker: config.error_marker.clone(),
            },
        }
    }
}

pub struct CommandRequest {
    source: Source,
    command: String,
    parameters: RwLock<ParameterSet>,
    user: User,
    display_name: String,
    channel_id: u64,
    guild_id: Option<u64>,
    quote_interactions: bool,
    replies: ReplyController,
}

impl std::fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRequest")
            .field("source", &self.source)
            .field("command", &self.command)
            .field("param_string", &self.param_string())
            .field("user", &self.user.username)
            .field("channel_id", &self.channel_id)
            .field("guild_id", &self.guild_id)
            .finish()
    }
}

impl CommandRequest {
    pub fn from_trigger(
        trigger: Trigger,
        settings: &RequestSettings,
        transport: Arc<dyn ReplyTransport>,
    ) -> Result<Self, RequestError> {
        match trigger {
            Trigger::Message { message } => Self::from_message(message, settings, transport),
            Trigger::Interaction { interaction } => {
                Self::from_interaction(interaction, settings, transport)
            }
        }
    }

    fn from_message(
        message: InboundMessage,
        settings: &RequestSettings,
        transport: Arc<dyn ReplyTransport>,
    ) -> Result<Self, RequestError> {
        let body = message
            .content
            .strip_prefix(settings.prefix.as_str())
            .ok_or_else(|| RequestError::MissingPrefix {
                prefix: settings.prefix.clone(),
            })?;

        let (command, remainder) = match body.split_once(char::is_whitespace) {
            Some((command, remainder)) => (command, remainder),
            None => (body, ""),
        };
        if command.is_empty() {
            return Err(RequestError::EmptyCommand);
        }

        let param_string = sanitize_mentions(remainder, &message.mentions);
        let parameters = ParameterSet::parse(&param_string, separator_for(command));
        let display_name = display_name_for(message.nickname.as_deref(), &message.author);

        let replies = ReplyController::new(
            transport,
            ReplyTarget::Message(MessageTarget {
                channel_id: message.channel_id,
                message_id: message.id,
            }),
            settings.style.clone(),
        );

        Ok(Self {
            source: Source::Message,
            command: command.to_string(),
            parameters: RwLock::new(parameters),
            user: message.author,
            display_name,
            channel_id: message.channel_id,
            guild_id: message.guild_id,
            quote_interactions: false,
            replies,
        })
    }

    fn from_interaction(
        interaction: InboundInteraction,
        settings: &RequestSettings,
        transport: Arc<dyn ReplyTransport>,
    ) -> Result<Self, RequestError> {
        let channel_id = interaction
            .channel_id
            .ok_or(RequestError::MissingChannel {
                interaction_id: interaction.id,
            })?;

        let command = interaction.command_name.clone();
        let separator = separator_for(&command);
        let param_string = join_options(&interaction, separator, &interaction.mentions);
        let parameters = ParameterSet::parse(&param_string, separator);
        let display_name = display_name_for(interaction.nickname.as_deref(), &interaction.user);

        let replies = ReplyController::new(
            transport,
            ReplyTarget::Interaction(InteractionTarget {
                interaction_id: interaction.id,
                token: interaction.token,
                channel_id,
            }),
            settings.style.clone(),
        );

        Ok(Self {
            source: Source::Interaction,
            command,
            parameters: RwLock::new(parameters),
            user: interaction.user,
            display_name,
            channel_id,
            guild_id: interaction.guild_id,
            quote_interactions: settings.quote_interactions,
            replies,
        })
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn parameters(&self) -> ParameterSet {
        self.parameters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn param_string(&self) -> String {
        self.parameters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .raw()
            .to_string()
    }

    /// Replace the parameter string with a canonical form before replying.
    pub fn rewrite_param_string(&self, canonical: &str) {
        let mut parameters = self
            .parameters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let separator = parameters.separator();
        *parameters = ParameterSet::parse(canonical, separator);
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Nickname or username, already escaped for markup.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    pub fn guild_id(&self) -> Option<u64> {
        self.guild_id
    }

    pub fn replies(&self) -> &ReplyController {
        &self.replies
    }

    pub async fn reply_state(&self) -> ReplyState {
        self.replies.state().await
    }

    pub async fn reply(&self, options: ReplyOptions) -> Result<(), ReplyError> {
        let quote = self.quote();
        self.replies.reply(&options, quote.as_ref()).await
    }

    pub async fn edit_reply(&self, options: ReplyOptions) -> Result<(), ReplyError> {
        let quote = self.quote();
        self.replies.edit_reply(&options, quote.as_ref()).await
    }

    pub async fn force_reply(&self, options: ReplyOptions) -> Result<(), ReplyError> {
        let quote = self.quote();
        self.replies.force_reply(&options, quote.as_ref()).await
    }

    pub async fn delete_reply(&self) -> Result<(), ReplyError> {
        self.replies.delete_reply().await
    }

    pub async fn defer_reply(&self) -> Result<(), ReplyError> {
        self.replies.defer_reply().await
    }

    fn quote(&self) -> Option<InvocationQuote> {
        if self.source != Source::Interaction || !self.quote_interactions {
            return None;
        }
        Some(InvocationQuote {
            display_name: self.display_name.clone(),
            command: self.command.clone(),
            param_string: self.param_string(),
        })
    }
}

fn display_name_for(nickname: Option<&str>, user: &User) -> String {
    escape_markdown(nickname.unwrap_or(&user.username))
}

fn join_options(
    interaction: &InboundInteraction,
    separator: char,
    mentions: &HashMap<u64, String>,
) -> String {
    let joined = interaction
        .options
        .iter()
        .map(|option| option.value_text())
        .collect::<Vec<_>>()
        .join(&separator.to_string());
    sanitize_mentions(&joined, mentions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        interaction_trigger, message_trigger, request, settings, RecordingTransport, WireCall,
    };
    use toshin_ipc::InteractionOption;

    #[test]
    fn message_command_is_first_token_without_prefix() {
        let transport = Arc::new(RecordingTransport::new());
        let request = request(message_trigger("!Hug my friend"), &transport);

        assert_eq!(request.source(), Source::Message);
        assert_eq!(request.command(), "Hug");
        assert_eq!(request.param_string(), "my friend");
        assert_eq!(request.parameters().values(), ["my", "friend"]);
        assert_eq!(request.channel_id(), 10);
        assert_eq!(request.guild_id(), Some(100));
    }

    #[test]
    fn message_without_parameters_has_empty_set() {
        let transport = Arc::new(RecordingTransport::new());
        let request = request(message_trigger("!echo"), &transport);

        assert_eq!(request.command(), "echo");
        assert_eq!(request.param_string(), "");
        assert!(request.parameters().is_empty());
        assert!(request.parameters().values().is_empty());
    }

    #[test]
    fn choice_messages_split_on_semicolon() {
        let transport = Arc::new(RecordingTransport::new());
        let request = request(message_trigger("!choose tea;coffee;hot water"), &transport);

        assert_eq!(request.parameters().separator(), ';');
        assert_eq!(
            request.parameters().values(),
            ["tea", "coffee", "hot water"]
        );
    }

    #[test]
    fn message_without_prefix_is_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let err = CommandRequest::from_trigger(message_trigger("echo hi"), &settings(), transport)
            .expect_err("missing prefix");
        assert!(matches!(err, RequestError::MissingPrefix { .. }));
    }

    #[test]
    fn bare_prefix_is_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let err = CommandRequest::from_trigger(message_trigger("! hi"), &settings(), transport)
            .expect_err("empty command");
        assert!(matches!(err, RequestError::EmptyCommand));
    }

    #[test]
    fn custom_prefix_is_honoured() {
        let transport = Arc::new(RecordingTransport::new());
        let settings = RequestSettings {
            prefix: "t!".to_string(),
            ..RequestSettings::default()
        };
        let request =
            CommandRequest::from_trigger(message_trigger("t!ping"), &settings, transport)
                .expect("valid");
        assert_eq!(request.command(), "ping");
    }

    #[test]
    fn message_mentions_are_sanitised() {
        let transport = Arc::new(RecordingTransport::new());
        let mut trigger = message_trigger("!hug <@42> @everyone");
        if let Trigger::Message { message } = &mut trigger {
            message.mentions.insert(42, "bob".to_string());
        }
        let request = request(trigger, &transport);
        assert_eq!(request.param_string(), "@bob @\u{200B}everyone");
    }

    #[test]
    fn interaction_joins_options_with_space() {
        let transport = Arc::new(RecordingTransport::new());
        let request = request(interaction_trigger("hug", &["my", "friend"]), &transport);

        assert_eq!(request.source(), Source::Interaction);
        assert_eq!(request.command(), "hug");
        assert_eq!(request.param_string(), "my friend");
    }

    #[test]
    fn interaction_choice_joins_options_with_semicolon() {
        let transport = Arc::new(RecordingTransport::new());
        let request = request(interaction_trigger("choice", &["tea", "coffee"]), &transport);

        assert_eq!(request.param_string(), "tea;coffee");
        assert_eq!(request.parameters().values(), ["tea", "coffee"]);
    }

    #[test]
    fn interaction_option_values_are_stringified() {
        let transport = Arc::new(RecordingTransport::new());
        let mut trigger = interaction_trigger("dice", &[]);
        if let Trigger::Interaction { interaction } = &mut trigger {
            interaction.options.push(InteractionOption::new("sides", 20));
        }
        let request = request(trigger, &transport);
        assert_eq!(request.param_string(), "20");
    }

    #[test]
    fn interaction_without_channel_is_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let mut trigger = interaction_trigger("ping", &[]);
        if let Trigger::Interaction { interaction } = &mut trigger {
            interaction.channel_id = None;
        }
        let err = CommandRequest::from_trigger(trigger, &settings(), transport.clone())
            .expect_err("missing channel");
        assert!(matches!(
            err,
            RequestError::MissingChannel { interaction_id: 5 }
        ));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn display_name_prefers_nickname_and_is_escaped() {
        let transport = Arc::new(RecordingTransport::new());
        let mut trigger = message_trigger("!ping");
        if let Trigger::Message { message } = &mut trigger {
            message.nickname = Some("*star*".to_string());
        }
        let nicknamed = request(trigger, &transport);
        let plain = request(message_trigger("!ping"), &transport);

        assert_eq!(nicknamed.display_name(), r"\*star\*");
        assert_eq!(plain.display_name(), "alice");
    }

    #[test]
    fn rewrite_param_string_is_visible_to_later_reads() {
        let transport = Arc::new(RecordingTransport::new());
        let request = request(message_trigger("!twitter <https://x.com/a>"), &transport);

        request.rewrite_param_string("https://twitter.com/a");
        assert_eq!(request.param_string(), "https://twitter.com/a");
        assert_eq!(request.parameters().values(), ["https://twitter.com/a"]);
    }

    #[tokio::test]
    async fn interaction_reply_quotes_invocation_when_enabled() {
        let transport = Arc::new(RecordingTransport::new());
        let settings = RequestSettings::default();
        let request = CommandRequest::from_trigger(
            interaction_trigger("echo", &["hi"]),
            &settings,
            transport.clone(),
        )
        .expect("valid");

        request
            .reply(ReplyOptions::text("Echo: hi"))
            .await
            .expect("reply");

        assert_eq!(
            transport.calls()[0].content(),
            Some("> alice: echo hi\n\nEcho: hi")
        );
    }

    #[tokio::test]
    async fn message_reply_is_never_quoted() {
        let transport = Arc::new(RecordingTransport::new());
        let request = CommandRequest::from_trigger(
            message_trigger("!echo hi"),
            &RequestSettings::default(),
            transport.clone(),
        )
        .expect("valid");

        request
            .reply(ReplyOptions::text("Echo: hi"))
            .await
            .expect("reply");

        match &transport.calls()[0] {
            WireCall::SendMessage { target, reply } => {
                assert_eq!(target.message_id, 1);
                assert_eq!(reply.content.as_deref(), Some("Echo: hi"));
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn request_level_reply_lifecycle() {
        let transport = Arc::new(RecordingTransport::new());
        let request = request(interaction_trigger("ping", &[]), &transport);

        assert_eq!(request.reply_state().await, ReplyState::NotReplied);
        assert_eq!(request.source(), Source::Interaction);
        request.defer_reply().await.expect("defer");
        assert_eq!(request.reply_state().await, ReplyState::Deferred);
        request
            .force_reply(ReplyOptions::text("pong"))
            .await
            .expect("force");
        assert_eq!(request.reply_state().await, ReplyState::Edited);
        request.delete_reply().await.expect("delete");
        assert_eq!(request.reply_state().await, ReplyState::Deleted);
        assert!(matches!(
            request.reply(ReplyOptions::text("again")).await,
            Err(ReplyError::AlreadyReplied)
        ));
    }
}
