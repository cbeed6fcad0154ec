use crate::errors::DomainError;
use crate::room_target::RoomTarget;
use crate::value_objects::{MessageContent, MessageId, Timestamp, UserId};

/// 待持久化的消息：内容在构造时完成校验。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub content: MessageContent,
    pub target: RoomTarget,
}

impl NewMessage {
    pub fn new(
        sender_id: UserId,
        content: impl Into<String>,
        target: RoomTarget,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            sender_id,
            content: MessageContent::new(content)?,
            target,
        })
    }
}

/// 持久化网关返回的规范形式：已分配 id 和时间戳，存储后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub target: RoomTarget,
    pub created_at: Timestamp,
}
