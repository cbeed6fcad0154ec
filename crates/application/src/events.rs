//! 双向通道上的事件类型。
//!
//! 帧格式为 `{"event": "<kebab-case>", "data": <payload>}`，
//! 载荷字段使用 camelCase，与前端客户端保持一致。

use chrono::{DateTime, Utc};
use domain::StoredMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::Session;

/// 在线用户快照条目。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: Uuid,
    pub display_name: String,
}

/// 房间消息载荷（全局或命名房间）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub room: String,
    pub created_at: DateTime<Utc>,
}

impl MessagePayload {
    /// 由已持久化的消息构造；私聊消息没有房间载荷。
    pub fn from_stored(message: &StoredMessage) -> Option<Self> {
        let room = message.target.wire_room()?.to_string();
        Some(Self {
            id: message.id.into(),
            sender_id: message.sender_id.into(),
            content: message.content.as_str().to_string(),
            room,
            created_at: message.created_at,
        })
    }
}

/// 私聊消息载荷。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessagePayload {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl PrivateMessagePayload {
    pub fn from_stored(message: &StoredMessage) -> Option<Self> {
        let receiver = message.target.private_peer(message.sender_id)?;
        Some(Self {
            id: message.id.into(),
            sender_id: message.sender_id.into(),
            receiver_id: receiver.into(),
            content: message.content.as_str().to_string(),
            created_at: message.created_at,
        })
    }
}

/// 输入状态载荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: Uuid,
    pub display_name: String,
    pub is_typing: bool,
}

/// 服务端推送给客户端的事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// 在线用户快照，只在连接建立时点对点发送一次
    OnlineUsers(Vec<OnlineUser>),
    UserOnline(OnlineUser),
    UserOffline(OnlineUser),
    NewMessage(MessagePayload),
    NewPrivateMessage(PrivateMessagePayload),
    UserTyping(TypingPayload),
    MessageError { reason: String },
    PrivateMessageError { reason: String },
}

impl ServerEvent {
    pub fn message_error(reason: impl Into<String>) -> Self {
        Self::MessageError {
            reason: reason.into(),
        }
    }

    pub fn private_message_error(reason: impl Into<String>) -> Self {
        Self::PrivateMessageError {
            reason: reason.into(),
        }
    }
}

/// 客户端发往服务端的事件，仅在 Authenticated 状态下有效。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    SendMessage {
        content: String,
        #[serde(default)]
        room: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SendPrivateMessage { receiver_id: Uuid, content: String },
    TypingStart {
        #[serde(default)]
        room: Option<String>,
    },
    TypingStop {
        #[serde(default)]
        room: Option<String>,
    },
}

impl From<&Session> for OnlineUser {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id.into(),
            display_name: session.display_name.as_str().to_string(),
        }
    }
}
