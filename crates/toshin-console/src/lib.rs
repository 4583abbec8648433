//! Toshin Console Adapter
//!
//! Line-oriented local transport: stdin lines become triggers, replies and
//! their edits are printed with monotonically increasing message ids

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use toshin_core::request::is_choice_command;
use toshin_core::{
    ChannelAdapter, InteractionReply, InteractionTarget, MessageReply, MessageTarget, ReplyHandle,
    ReplyTransport,
};
use toshin_ipc::{
    Embed, Envelope, EventBus, InboundInteraction, InboundMessage, InteractionOption, Trigger,
    User,
};
use tracing::{debug, info, warn};

pub const CONSOLE_CHANNEL: &str = "console";
pub const CONSOLE_CHANNEL_ID: u64 = 1;
const CONSOLE_USER_ID: u64 = 1;
const CONSOLE_MAX_MESSAGE_LEN: usize = 2000;

pub struct ConsoleAdapter {
    user: User,
    guild_id: Option<u64>,
    next_id: AtomicU64,
    interaction_messages: Mutex<HashMap<u64, u64>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleAdapter {
    pub fn new(username: &str, guild_id: Option<u64>) -> Self {
        Self {
            user: User {
                id: CONSOLE_USER_ID,
                username: username.to_string(),
                bot: false,
            },
            guild_id,
            next_id: AtomicU64::new(1),
            interaction_messages: Mutex::new(HashMap::new()),
            output: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = Mutex::new(output);
        self
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Turn one input line into a trigger. Blank lines yield nothing.
    pub fn parse_line(&self, line: &str) -> Result<Option<Trigger>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        if line.starts_with('{') {
            let trigger: Trigger =
                serde_json::from_str(line).context("Invalid trigger JSON on console input")?;
            return Ok(Some(trigger));
        }

        if let Some(invocation) = line.strip_prefix('/') {
            return self.parse_interaction(invocation).map(Some);
        }

        Ok(Some(Trigger::Message {
            message: InboundMessage {
                id: self.next_id(),
                channel_id: CONSOLE_CHANNEL_ID,
                guild_id: self.guild_id,
                content: line.to_string(),
                author: self.user.clone(),
                nickname: None,
                mentions: HashMap::new(),
            },
        }))
    }

    fn parse_interaction(&self, invocation: &str) -> Result<Trigger> {
        let (name, args) = match invocation.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (invocation, ""),
        };
        if name.is_empty() {
            return Err(anyhow!("Missing command name after '/'"));
        }

        let values: Vec<&str> = if args.is_empty() {
            Vec::new()
        } else if is_choice_command(name) {
            args.split(';').map(str::trim).collect()
        } else {
            vec![args]
        };
        let options = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| InteractionOption::new(&format!("option{}", i + 1), value))
            .collect();

        let id = self.next_id();
        Ok(Trigger::Interaction {
            interaction: InboundInteraction {
                id,
                token: format!("console-{}", id),
                command_name: name.to_string(),
                channel_id: Some(CONSOLE_CHANNEL_ID),
                guild_id: self.guild_id,
                user: self.user.clone(),
                nickname: None,
                options,
                mentions: HashMap::new(),
            },
        })
    }

    /// Publish one envelope per parsed line until the reader is exhausted.
    pub async fn read_lines<R>(&self, reader: R, event_bus: &EventBus) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            match self.parse_line(&line) {
                Ok(Some(trigger)) => {
                    debug!(kind = trigger.kind(), "Console trigger");
                    if let Err(e) = event_bus.publish(Envelope::new(CONSOLE_CHANNEL, trigger)) {
                        warn!("Failed to publish console trigger: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping console line: {:#}", e);
                    self.print(&format!("! {:#}", e))?;
                }
            }
        }
        info!("Console input closed");
        Ok(())
    }

    fn print(&self, text: &str) -> Result<()> {
        let mut output = self
            .output
            .lock()
            .map_err(|_| anyhow!("console output lock poisoned"))?;
        let stamp = chrono::Local::now().format("%H:%M:%S");
        for line in text.lines() {
            writeln!(output, "[{}] {}", stamp, line)?;
        }
        output.flush()?;
        Ok(())
    }

    fn interaction_message(&self, interaction_id: u64) -> u64 {
        let mut messages = self
            .interaction_messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *messages
            .entry(interaction_id)
            .or_insert_with(|| self.next_id())
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for ConsoleAdapter {
    fn channel_name(&self) -> &str {
        CONSOLE_CHANNEL
    }

    async fn start(&self, event_bus: EventBus) -> Result<()> {
        info!("Console adapter reading from stdin");
        self.read_lines(BufReader::new(tokio::io::stdin()), &event_bus)
            .await
    }
}

#[async_trait::async_trait]
impl ReplyTransport for ConsoleAdapter {
    async fn send_message_reply(
        &self,
        target: &MessageTarget,
        reply: MessageReply,
    ) -> Result<ReplyHandle> {
        let message_id = self.next_id();
        self.print(&format!(
            "#{} reply to #{}{}\n{}",
            message_id,
            target.message_id,
            ping_marker(reply.allowed_mentions.replied_user),
            render_message_reply(&reply)
        ))?;
        Ok(ReplyHandle {
            channel_id: target.channel_id,
            message_id,
            deletable: true,
        })
    }

    async fn edit_message(&self, handle: &ReplyHandle, reply: MessageReply) -> Result<ReplyHandle> {
        self.print(&format!(
            "#{} edited\n{}",
            handle.message_id,
            render_message_reply(&reply)
        ))?;
        Ok(*handle)
    }

    async fn delete_message(&self, handle: &ReplyHandle) -> Result<()> {
        self.print(&format!("#{} deleted", handle.message_id))
    }

    async fn create_interaction_response(
        &self,
        target: &InteractionTarget,
        reply: InteractionReply,
    ) -> Result<ReplyHandle> {
        let message_id = self.interaction_message(target.interaction_id);
        self.print(&format!(
            "#{} response to /{}{}\n{}",
            message_id,
            target.interaction_id,
            ephemeral_marker(reply.ephemeral),
            render_interaction_reply(&reply)
        ))?;
        Ok(ReplyHandle {
            channel_id: target.channel_id,
            message_id,
            deletable: true,
        })
    }

    async fn defer_interaction(&self, target: &InteractionTarget) -> Result<()> {
        let message_id = self.interaction_message(target.interaction_id);
        self.print(&format!(
            "#{} response to /{} is thinking...",
            message_id, target.interaction_id
        ))
    }

    async fn edit_interaction_response(
        &self,
        target: &InteractionTarget,
        reply: InteractionReply,
    ) -> Result<ReplyHandle> {
        let message_id = self.interaction_message(target.interaction_id);
        self.print(&format!(
            "#{} edited{}\n{}",
            message_id,
            ephemeral_marker(reply.ephemeral),
            render_interaction_reply(&reply)
        ))?;
        Ok(ReplyHandle {
            channel_id: target.channel_id,
            message_id,
            deletable: true,
        })
    }

    async fn delete_interaction_response(&self, target: &InteractionTarget) -> Result<()> {
        let message_id = self
            .interaction_messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&target.interaction_id)
            .ok_or_else(|| anyhow!("interaction {} has no response", target.interaction_id))?;
        self.print(&format!("#{} deleted", message_id))
    }
}

fn ping_marker(replied_user: bool) -> &'static str {
    if replied_user {
        " (ping)"
    } else {
        ""
    }
}

fn ephemeral_marker(ephemeral: bool) -> &'static str {
    if ephemeral {
        " (only you can see this)"
    } else {
        ""
    }
}

pub fn render_message_reply(reply: &MessageReply) -> String {
    render_parts(
        reply.content.as_deref(),
        &reply.embeds,
        reply.files.iter().map(|file| (file.name.as_str(), file.data.len())),
        reply.components.iter().flatten().map(|b| b.label.as_str()),
    )
}

pub fn render_interaction_reply(reply: &InteractionReply) -> String {
    render_parts(
        reply.content.as_deref(),
        &reply.embeds,
        reply.files.iter().map(|file| (file.name.as_str(), file.data.len())),
        reply.components.iter().flatten().map(|b| b.label.as_str()),
    )
}

fn render_parts<'a>(
    content: Option<&str>,
    embeds: &[Embed],
    files: impl Iterator<Item = (&'a str, usize)>,
    buttons: impl Iterator<Item = &'a str>,
) -> String {
    let mut lines = Vec::new();

    if let Some(content) = content {
        lines.extend(chunk_message(content));
    }
    for embed in embeds {
        if let Some(description) = &embed.description {
            for line in description.lines() {
                lines.push(format!("| {}", line));
            }
        }
        if let Some(url) = &embed.image_url {
            lines.push(format!("| [image] {}", url));
        }
    }
    for (name, size) in files {
        lines.push(format!("[file] {} ({} bytes)", name, size));
    }
    let buttons: Vec<String> = buttons.map(|label| format!("[{}]", label)).collect();
    if !buttons.is_empty() {
        lines.push(buttons.join(" "));
    }

    if lines.is_empty() {
        "(empty)".to_string()
    } else {
        lines.join("\n")
    }
}

/// Split text into chunks no longer than the message limit, preferring to
/// break after whitespace or sentence punctuation.
pub fn chunk_message(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= CONSOLE_MAX_MESSAGE_LEN {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + CONSOLE_MAX_MESSAGE_LEN).min(chars.len());

        if end < chars.len() {
            if let Some(split) = (start..end)
                .rev()
                .find(|&i| matches!(chars[i], '\n' | ' ' | '.' | '!' | '?'))
            {
                end = split + 1;
            }
        }

        chunks.push(chars[start..end].iter().collect::<String>());
        start = end;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use toshin_core::reply::AllowedMentions;
    use toshin_ipc::Button;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().expect("buffer lock").clone()).expect("utf8")
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn adapter() -> (ConsoleAdapter, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let adapter = ConsoleAdapter::new("console", Some(42)).with_output(Box::new(buffer.clone()));
        (adapter, buffer)
    }

    fn text_reply(content: &str) -> MessageReply {
        MessageReply {
            content: Some(content.to_string()),
            allowed_mentions: AllowedMentions::default(),
            embeds: Vec::new(),
            files: Vec::new(),
            components: Vec::new(),
        }
    }

    #[test]
    fn plain_lines_become_messages() {
        let (adapter, _) = adapter();
        let trigger = adapter.parse_line("  !echo hi ").expect("parse").expect("trigger");
        match trigger {
            Trigger::Message { message } => {
                assert_eq!(message.content, "!echo hi");
                assert_eq!(message.guild_id, Some(42));
                assert_eq!(message.author.username, "console");
            }
            other => panic!("unexpected trigger: {:?}", other),
        }
        assert!(adapter.parse_line("   ").expect("parse").is_none());
    }

    #[test]
    fn slash_lines_become_interactions() {
        let (adapter, _) = adapter();
        let Some(Trigger::Interaction { interaction }) =
            adapter.parse_line("/hug my friend").expect("parse")
        else {
            panic!("expected an interaction");
        };
        assert_eq!(interaction.command_name, "hug");
        assert_eq!(interaction.channel_id, Some(CONSOLE_CHANNEL_ID));
        assert_eq!(interaction.options.len(), 1);
        assert_eq!(interaction.options[0].value_text(), "my friend");
        assert_eq!(interaction.token, format!("console-{}", interaction.id));
    }

    #[test]
    fn choice_interactions_split_options() {
        let (adapter, _) = adapter();
        let Some(Trigger::Interaction { interaction }) =
            adapter.parse_line("/choose tea ; coffee").expect("parse")
        else {
            panic!("expected an interaction");
        };
        let values: Vec<String> = interaction.options.iter().map(|o| o.value_text()).collect();
        assert_eq!(values, ["tea", "coffee"]);
        assert_eq!(interaction.options[1].name, "option2");
    }

    #[test]
    fn json_lines_are_parsed_as_triggers() {
        let (adapter, _) = adapter();
        let json = r#"{"type":"interaction","interaction":{"id":9,"token":"t","command_name":"ping","user":{"id":3,"username":"bob"}}}"#;
        let Some(Trigger::Interaction { interaction }) = adapter.parse_line(json).expect("parse")
        else {
            panic!("expected an interaction");
        };
        assert_eq!(interaction.id, 9);
        assert_eq!(interaction.channel_id, None);

        assert!(adapter.parse_line("{not json").is_err());
        assert!(adapter.parse_line("/").is_err());
    }

    #[tokio::test]
    async fn read_lines_publishes_envelopes() {
        let (adapter, buffer) = adapter();
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let input: &[u8] = b"!ping\n\n{broken\n/dice 20\n";
        adapter
            .read_lines(BufReader::new(input), &bus)
            .await
            .expect("read");

        let first = rx.recv().await.expect("first");
        assert_eq!(first.channel, CONSOLE_CHANNEL);
        assert_eq!(first.trigger.kind(), "message");
        let second = rx.recv().await.expect("second");
        assert_eq!(second.trigger.kind(), "interaction");
        assert!(rx.try_recv().is_err());
        assert!(buffer.text().contains("Invalid trigger JSON"));
    }

    #[tokio::test]
    async fn message_ids_increase_monotonically() {
        let (adapter, buffer) = adapter();
        let target = MessageTarget {
            channel_id: CONSOLE_CHANNEL_ID,
            message_id: 7,
        };

        let first = adapter
            .send_message_reply(&target, text_reply("one"))
            .await
            .expect("send");
        let second = adapter
            .send_message_reply(&target, text_reply("two"))
            .await
            .expect("send");
        assert!(second.message_id > first.message_id);

        adapter
            .edit_message(&first, text_reply("uno"))
            .await
            .expect("edit");
        adapter.delete_message(&second).await.expect("delete");

        let out = buffer.text();
        assert!(out.contains(&format!("#{} reply to #7\n", first.message_id)));
        assert!(out.contains(&format!("#{} edited", first.message_id)));
        assert!(out.contains(&format!("#{} deleted", second.message_id)));
    }

    #[tokio::test]
    async fn interaction_keeps_one_message_across_defer_and_edit() {
        let (adapter, buffer) = adapter();
        let target = InteractionTarget {
            interaction_id: 99,
            token: "console-99".to_string(),
            channel_id: CONSOLE_CHANNEL_ID,
        };
        let reply = InteractionReply {
            content: Some("Error: nope".to_string()),
            ephemeral: true,
            allowed_mentions: AllowedMentions::default(),
            embeds: Vec::new(),
            files: Vec::new(),
            components: Vec::new(),
        };

        adapter.defer_interaction(&target).await.expect("defer");
        let handle = adapter
            .edit_interaction_response(&target, reply)
            .await
            .expect("edit");
        adapter
            .delete_interaction_response(&target)
            .await
            .expect("delete");
        assert!(adapter.delete_interaction_response(&target).await.is_err());

        let out = buffer.text();
        assert!(out.contains(&format!("#{} response to /99 is thinking...", handle.message_id)));
        assert!(out.contains("(only you can see this)"));
        assert!(out.contains(&format!("#{} deleted", handle.message_id)));
    }

    #[test]
    fn renders_embeds_files_and_buttons() {
        let reply = MessageReply {
            content: None,
            allowed_mentions: AllowedMentions::default(),
            embeds: vec![
                Embed::description("line one\nline two"),
                Embed::image("https://example.com/cat.gif"),
            ],
            files: vec![toshin_ipc::FileAttachment {
                name: "a.txt".to_string(),
                data: vec![0; 3],
            }],
            components: vec![vec![Button {
                label: "Next".to_string(),
                custom_id: "next".to_string(),
            }]],
        };
        assert_eq!(
            render_message_reply(&reply),
            "| line one\n| line two\n| [image] https://example.com/cat.gif\n[file] a.txt (3 bytes)\n[Next]"
        );
        assert_eq!(render_message_reply(&text_reply("")), "");
    }

    #[test]
    fn chunk_message_preserves_content() {
        let text = format!("{} {}", "😀".repeat(5000), "fine");
        let chunks = chunk_message(&text);
        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .all(|chunk| chunk.chars().count() <= CONSOLE_MAX_MESSAGE_LEN));
        assert_eq!(chunks.concat(), text);
    }
}
