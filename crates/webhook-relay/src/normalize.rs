//! Turns Telegram webhook updates into aggregator items.

use batch_aggregator::{Item, Recipient};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: Option<i64>,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Value>,
    pub document: Option<Value>,
    pub video: Option<Value>,
    pub audio: Option<Value>,
    pub voice: Option<Value>,
    pub forward_origin: Option<ForwardOrigin>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        if name.trim().is_empty() {
            self.username.clone()
        } else {
            Some(name.trim().to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForwardOrigin {
    User {
        date: i64,
        sender_user: User,
    },
    HiddenUser {
        date: i64,
        sender_user_name: String,
    },
    Chat {
        date: i64,
        sender_chat: Chat,
    },
    Channel {
        date: i64,
        chat: Chat,
        message_id: i64,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, PartialEq)]
pub enum Normalized {
    Accepted(Item),
    Ignored(&'static str),
}

fn iso_date(unix: i64) -> Value {
    chrono::DateTime::from_timestamp(unix, 0)
        .map(|date| Value::String(date.to_rfc3339()))
        .unwrap_or(Value::Null)
}

fn media_type(message: &Message) -> Option<&'static str> {
    [
        (&message.photo, "photo"),
        (&message.document, "document"),
        (&message.video, "video"),
        (&message.audio, "audio"),
        (&message.voice, "voice"),
    ]
    .into_iter()
    .find(|(media, _)| media.is_some())
    .map(|(_, kind)| kind)
}

pub fn normalize(update: Update, forwarded_only: bool) -> Normalized {
    let Some(message) = update.message else {
        return Normalized::Ignored("update carries no message");
    };

    if forwarded_only && message.forward_origin.is_none() {
        return Normalized::Ignored("message is not forwarded");
    }

    let Some(content) = message
        .text
        .clone()
        .or_else(|| message.caption.clone())
        .filter(|content| !content.trim().is_empty())
    else {
        return Normalized::Ignored("message has no text");
    };

    let media_type = media_type(&message);
    let sender = message.from.as_ref();
    let forwarded_at = message.date.map(iso_date).unwrap_or(Value::Null);

    let mut channel_username = "DirectMessage".to_string();
    let mut author = sender
        .and_then(User::full_name)
        .unwrap_or_else(|| "Unknown".into());
    let mut timestamp = forwarded_at.clone();
    let mut url = String::new();

    match &message.forward_origin {
        Some(ForwardOrigin::Channel {
            date,
            chat,
            message_id,
        }) => {
            let title = chat.title.clone().unwrap_or_else(|| "Channel".into());
            channel_username = match &chat.username {
                Some(username) => format!("@{}", username),
                None => title.clone(),
            };
            if let Some(username) = &chat.username {
                url = format!("https://t.me/{}/{}", username, message_id);
            }
            author = title;
            timestamp = iso_date(*date);
        }
        Some(ForwardOrigin::User { date, sender_user }) => {
            author = sender_user.full_name().unwrap_or_else(|| "User".into());
            timestamp = iso_date(*date);
        }
        Some(ForwardOrigin::HiddenUser {
            date,
            sender_user_name,
        }) => {
            author = sender_user_name.clone();
            timestamp = iso_date(*date);
        }
        Some(ForwardOrigin::Chat { date, sender_chat }) => {
            author = sender_chat.title.clone().unwrap_or_else(|| "Chat".into());
            timestamp = iso_date(*date);
        }
        Some(ForwardOrigin::Unknown) | None => {}
    }

    let item = Item::new(message.message_id.to_string())
        .with_recipient(Recipient::new(message.chat.id.to_string()))
        .with_field("content", content)
        .with_field("has_media", media_type.is_some())
        .with_field("media_type", media_type)
        .with_field(
            "forwarded_by",
            sender
                .and_then(|user| user.username.clone())
                .unwrap_or_else(|| "Unknown".into()),
        )
        .with_field("forwarded_at", forwarded_at)
        .with_field("channel", "telegram")
        .with_field("channel_username", channel_username)
        .with_field("author", author)
        .with_field("timestamp", timestamp)
        .with_field("url", url);

    Normalized::Accepted(item)
}
