use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, KeyboardButton, KeyboardMarkup, KeyboardRemove, Me, MessageEntityKind,
};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::platform::{split_message, ChatChannel, Reply, ReplyMarkup};
use crate::relay::{
    classify_text, DocumentInfo, InboundEvent, MenuChoice, Relay, Sender, MENU_PLACEHOLDER,
};

/// Telegram rejects messages above 4096 chars; keep some headroom
const MAX_MESSAGE_LEN: usize = 4000;

/// Replies and downloads for a single Telegram chat
pub struct TelegramChannel {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChannel {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl ChatChannel for TelegramChannel {
    async fn send_reply(&self, reply: &Reply) -> Result<()> {
        let chunks = split_message(&reply.text, MAX_MESSAGE_LEN);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let request = self.bot.send_message(self.chat_id, chunk);
            // Keyboards go on the final chunk only
            let request = match (i == last, reply.markup) {
                (true, ReplyMarkup::MainMenu) => request.reply_markup(main_menu_keyboard()),
                (true, ReplyMarkup::RemoveKeyboard) => request.reply_markup(KeyboardRemove::new()),
                _ => request,
            };
            request
                .await
                .with_context(|| format!("Failed to send reply to chat {}", self.chat_id.0))?;
        }

        Ok(())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .context("Failed to look up file on Telegram")?;

        let mut buf = Vec::new();
        self.bot
            .download_file(&file.path, &mut buf)
            .await
            .context("Failed to download file from Telegram")?;

        Ok(buf)
    }
}

/// The two-button menu shown after `/start`
pub fn main_menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(MenuChoice::UploadFile.caption()),
        KeyboardButton::new(MenuChoice::SendMessage.caption()),
    ]])
    .one_time_keyboard()
    .resize_keyboard()
    .input_field_placeholder(MENU_PLACEHOLDER)
}

/// Commands the bot answers; any other command is ignored
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
enum Command {
    /// Deep-link payloads after `/start` are accepted and ignored
    #[command(description = "Show the greeting and the main menu.")]
    Start(String),
}

/// Telegram marks commands with a `bot_command` entity at offset 0.
fn starts_with_command(msg: &Message) -> bool {
    msg.entities().is_some_and(|entities| {
        entities
            .iter()
            .any(|e| e.offset == 0 && e.kind == MessageEntityKind::BotCommand)
    })
}

/// Parse a command for this bot. Command names match case-insensitively,
/// and commands addressed to another bot yield `None`.
fn parse_command(text: &str, bot_username: &str) -> Option<Command> {
    let (name, args) = text.split_at(text.find(char::is_whitespace).unwrap_or(text.len()));
    let normalized = format!("{}{}", name.to_lowercase(), args);
    Command::parse(&normalized, &bot_username.to_lowercase()).ok()
}

/// Turn a Telegram message into an event the relay understands.
/// Returns `None` for messages the relay does not handle.
fn inbound_event(msg: &Message, bot_username: &str) -> Option<InboundEvent> {
    let user = msg.from.as_ref()?;
    let sender = Sender {
        id: user.id.0,
        first_name: user.first_name.clone(),
        username: user.username.clone(),
    };

    if let Some(doc) = msg.document() {
        return Some(InboundEvent::Document {
            sender,
            document: DocumentInfo::new(
                doc.file.id.0.clone(),
                doc.file_name.clone(),
                doc.mime_type.as_ref().map(ToString::to_string),
            ),
        });
    }

    let text = msg.text()?;
    if starts_with_command(msg) {
        return match parse_command(text, bot_username)? {
            Command::Start(payload) => {
                if !payload.is_empty() {
                    debug!("Ignoring /start payload: {}", payload);
                }
                Some(InboundEvent::Start { sender })
            }
        };
    }

    Some(classify_text(sender, text))
}

/// Drop messages from senders outside the configured allow-list.
fn allowed_message(msg: Message, config: &Config) -> Option<Message> {
    let user_id = msg.from.as_ref()?.id.0;
    if config.is_user_allowed(user_id) {
        Some(msg)
    } else {
        debug!("Ignoring message from user {}", user_id);
        None
    }
}

/// Run the Telegram bot platform
pub async fn run(relay: Arc<Relay>) -> Result<()> {
    let bot = Bot::new(&relay.config().telegram.bot_token);

    info!("Starting Telegram platform...");

    let gate = Arc::clone(&relay);
    let handler = Update::filter_message()
        .filter_map(move |msg: Message| allowed_message(msg, gate.config()))
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Telegram platform stopped");
    Ok(())
}

async fn handle_message(bot: Bot, me: Me, msg: Message, relay: Arc<Relay>) -> Result<()> {
    let Some(event) = inbound_event(&msg, me.username()) else {
        debug!(
            "Skipping unsupported message {} in chat {}",
            msg.id.0, msg.chat.id.0
        );
        return Ok(());
    };

    let channel = TelegramChannel::new(bot, msg.chat.id);
    relay.dispatch(event, &channel).await
}
