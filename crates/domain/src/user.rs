use crate::value_objects::{DisplayName, Timestamp, UserId};

/// 用户档案（协作方 CRUD 层的稳定输入形状）。
///
/// 在握手成功时 upsert，断开连接时更新 `last_seen`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: DisplayName,
    pub last_seen: Option<Timestamp>,
}

impl UserProfile {
    pub fn new(id: UserId, display_name: DisplayName) -> Self {
        Self {
            id,
            display_name,
            last_seen: None,
        }
    }
}
