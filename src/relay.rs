use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::Config;
use crate::platform::{ChatChannel, Reply, ReplyMarkup};
use crate::webhook::{DeliveryError, FileUpload, MessagePayload, WebhookClient};

pub const UPLOAD_FILE_CAPTION: &str = "📂 Upload File";
pub const SEND_MESSAGE_CAPTION: &str = "📝 Send Message";
pub const MENU_PLACEHOLDER: &str = "Please choose an option...";

/// Name used when a document arrives without one
const FALLBACK_FILE_NAME: &str = "file";

/// Who sent an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub first_name: String,
    pub username: Option<String>,
}

/// One of the two main-menu buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    UploadFile,
    SendMessage,
}

impl MenuChoice {
    /// Exact, case-sensitive match against the button captions.
    pub fn from_caption(text: &str) -> Option<Self> {
        match text {
            UPLOAD_FILE_CAPTION => Some(Self::UploadFile),
            SEND_MESSAGE_CAPTION => Some(Self::SendMessage),
            _ => None,
        }
    }

    pub fn caption(self) -> &'static str {
        match self {
            Self::UploadFile => UPLOAD_FILE_CAPTION,
            Self::SendMessage => SEND_MESSAGE_CAPTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
}

impl DocumentInfo {
    pub fn new(
        file_id: impl Into<String>,
        file_name: Option<String>,
        mime_type: Option<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string()),
            mime_type,
        }
    }
}

/// A classified inbound chat event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Start { sender: Sender },
    MenuChoice { sender: Sender, choice: MenuChoice },
    Text { sender: Sender, text: String },
    Document { sender: Sender, document: DocumentInfo },
}

impl InboundEvent {
    pub fn sender(&self) -> &Sender {
        match self {
            Self::Start { sender }
            | Self::MenuChoice { sender, .. }
            | Self::Text { sender, .. }
            | Self::Document { sender, .. } => sender,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::MenuChoice { .. } => "menu_choice",
            Self::Text { .. } => "text",
            Self::Document { .. } => "document",
        }
    }
}

/// Something a handler wants done, performed later by [`Relay::perform`]
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Reply(Reply),
    ForwardMessage {
        url: String,
        payload: MessagePayload,
    },
    ForwardFile {
        url: String,
        sender: Sender,
        document: DocumentInfo,
    },
}

/// Which webhook a delivery went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Message,
    File,
}

/// Classify non-command text: a menu caption or a free-form message.
/// Command detection happens on the platform side, where entities are known.
pub fn classify_text(sender: Sender, text: &str) -> InboundEvent {
    match MenuChoice::from_caption(text) {
        Some(choice) => InboundEvent::MenuChoice { sender, choice },
        None => InboundEvent::Text {
            sender,
            text: text.to_string(),
        },
    }
}

/// Map an event to the actions that answer it.
pub fn handle(event: &InboundEvent, config: &Config) -> Vec<Action> {
    match event {
        InboundEvent::Start { sender } => start(sender),
        InboundEvent::MenuChoice { choice, .. } => handle_choice(*choice),
        InboundEvent::Text { sender, text } => handle_text_message(sender, text, config),
        InboundEvent::Document { sender, document } => handle_file(sender, document, config),
    }
}

pub fn start(sender: &Sender) -> Vec<Action> {
    vec![
        Action::Reply(Reply::text(format!(
            "👋 Hello {}! Welcome to your bot.",
            sender.first_name
        ))),
        Action::Reply(Reply::with_markup(
            "What would you like to do?",
            ReplyMarkup::MainMenu,
        )),
    ]
}

pub fn handle_choice(choice: MenuChoice) -> Vec<Action> {
    let prompt = match choice {
        MenuChoice::UploadFile => "Please upload your file now. 📤",
        MenuChoice::SendMessage => "Please type your message now. 🖊️",
    };
    vec![Action::Reply(Reply::with_markup(
        prompt,
        ReplyMarkup::RemoveKeyboard,
    ))]
}

pub fn handle_text_message(sender: &Sender, text: &str, config: &Config) -> Vec<Action> {
    let mut actions = vec![Action::Reply(Reply::text(format!(
        "✅ Got your message:\n\n\"{}\"",
        text
    )))];

    if let Some(url) = config.message_webhook() {
        actions.push(Action::ForwardMessage {
            url: url.to_string(),
            payload: MessagePayload {
                text: text.to_string(),
                user_id: sender.id,
                first_name: sender.first_name.clone(),
                username: sender.username.clone(),
            },
        });
    }

    actions
}

pub fn handle_file(sender: &Sender, document: &DocumentInfo, config: &Config) -> Vec<Action> {
    let mut actions = vec![Action::Reply(Reply::text(format!(
        "📂 Thanks! You uploaded: {}",
        document.file_name
    )))];

    if let Some(url) = config.file_webhook() {
        actions.push(Action::ForwardFile {
            url: url.to_string(),
            sender: sender.clone(),
            document: document.clone(),
        });
    }

    actions
}

/// The status reply for a finished webhook delivery.
pub fn delivery_reply(delivery: Delivery, outcome: &Result<(), DeliveryError>) -> Reply {
    let text = match (delivery, outcome) {
        (Delivery::Message, Ok(())) => "🚀 Message successfully sent to your workflow!",
        (Delivery::Message, Err(_)) => "⚠️ Could not connect to the n8n workflow.",
        (Delivery::File, Ok(())) => "🚀 File successfully sent to your workflow!",
        (Delivery::File, Err(_)) => "⚠️ Could not send the file to the n8n workflow.",
    };
    Reply::text(text)
}

/// Shared, immutable relay state: configuration plus the webhook client.
pub struct Relay {
    config: Config,
    webhook: WebhookClient,
}

impl Relay {
    pub fn new(config: Config) -> Result<Self> {
        let webhook = WebhookClient::new(config.webhook_timeout())?;
        Ok(Self { config, webhook })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one inbound event end to end.
    pub async fn dispatch(&self, event: InboundEvent, chat: &dyn ChatChannel) -> Result<()> {
        let sender = event.sender();
        info!(
            "Relaying {} event from {} ({})",
            event.kind(),
            sender.first_name,
            sender.id
        );

        let actions = handle(&event, &self.config);
        self.perform(actions, chat).await
    }

    /// Run actions in order. Webhook failures become warning replies;
    /// reply and download failures are returned to the caller.
    pub async fn perform(&self, actions: Vec<Action>, chat: &dyn ChatChannel) -> Result<()> {
        for action in actions {
            match action {
                Action::Reply(reply) => chat.send_reply(&reply).await?,
                Action::ForwardMessage { url, payload } => {
                    let outcome = self.webhook.post_message(&url, &payload).await;
                    if let Err(e) = &outcome {
                        error!("Error sending message to n8n: {}", e);
                    }
                    chat.send_reply(&delivery_reply(Delivery::Message, &outcome))
                        .await?;
                }
                Action::ForwardFile {
                    url,
                    sender,
                    document,
                } => {
                    let bytes = chat.download(&document.file_id).await.with_context(|| {
                        format!("Failed to download '{}'", document.file_name)
                    })?;
                    info!(
                        "Downloaded '{}' ({} bytes) from user {}",
                        document.file_name,
                        bytes.len(),
                        sender.id
                    );

                    let upload = FileUpload {
                        file_name: document.file_name,
                        mime_type: document.mime_type,
                        bytes,
                        user_id: sender.id,
                        first_name: sender.first_name,
                        username: sender.username,
                    };
                    let outcome = self.webhook.post_file(&url, upload).await;
                    if let Err(e) = &outcome {
                        error!("Error sending file to n8n: {}", e);
                    }
                    chat.send_reply(&delivery_reply(Delivery::File, &outcome))
                        .await?;
                }
            }
        }
        Ok(())
    }
}
