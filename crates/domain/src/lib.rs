//! 实时聊天系统核心领域模型
//!
//! 包含用户、投递范围（RoomTarget）、消息等值对象，
//! 以及领域错误和持久化错误的定义。

pub mod errors;
pub mod message;
pub mod room_target;
pub mod user;
pub mod value_objects;

pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{NewMessage, StoredMessage};
pub use room_target::RoomTarget;
pub use user::UserProfile;
pub use value_objects::{
    ConnectionId, DisplayName, MessageContent, MessageId, RoomName, Timestamp, UserId,
};
