//! 领域错误与持久化错误定义

use thiserror::Error;

/// 领域模型错误类型
///
/// 校验与授权失败都在连接网关本地解决，不会扩散到其他用户。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// 输入校验失败（内容为空、超长等）
    #[error("{field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 向未加入的命名房间发送消息
    #[error("not a member of room {room}")]
    NotAMember { room: String },

    /// 命名房间不存在
    #[error("room not found: {room}")]
    RoomNotFound { room: String },

    /// 私聊接收者不存在
    #[error("recipient not found")]
    RecipientNotFound,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_a_member(room: impl Into<String>) -> Self {
        Self::NotAMember { room: room.into() }
    }

    pub fn room_not_found(room: impl Into<String>) -> Self {
        Self::RoomNotFound { room: room.into() }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

/// 持久化协作方错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("resource not found")]
    NotFound,
    #[error("resource already exists")]
    Conflict,
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
