//! 持久化协作方接口。
//!
//! 实时分发层只依赖这些 trait：消息的持久化与历史查询、命名
//! 房间的成员关系、以及用户档案。成员资格的增删由外部 CRUD
//! 层负责，这里只消费其结果。

use async_trait::async_trait;
use domain::{
    MessageId, NewMessage, RepositoryError, RoomName, RoomTarget, StoredMessage, Timestamp,
    UserId, UserProfile,
};

/// 消息持久化网关。
///
/// 广播绝不允许先于 `store` 成功发生——否则会出现能实时看到、
/// 却在历史里消失的幽灵消息。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化消息并返回规范存储形式（分配 id 与时间戳）。
    async fn store(&self, message: NewMessage) -> Result<StoredMessage, RepositoryError>;

    /// 目标范围内最近的消息，按时间升序返回，最多 `limit` 条；
    /// `before` 给定时只返回该消息之前的窗口。只在连接/翻页时
    /// 使用，不参与实时分发路径。
    async fn fetch_recent(
        &self,
        target: &RoomTarget,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;
}

/// 命名房间成员关系协作方。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomMemberRepository: Send + Sync {
    /// 创建房间，创建者自动成为成员；重名返回 `Conflict`。
    async fn create_room(&self, name: RoomName, creator: UserId) -> Result<(), RepositoryError>;

    /// 加入房间；房间不存在返回 `NotFound`。
    async fn join(&self, room: &RoomName, user: UserId) -> Result<(), RepositoryError>;

    /// 房间不存在返回 `NotFound`。
    async fn is_member(&self, room: &RoomName, user: UserId) -> Result<bool, RepositoryError>;

    /// 房间的持久化成员列表，与在线状态无关。
    async fn list_member_ids(&self, room: &RoomName) -> Result<Vec<UserId>, RepositoryError>;

    async fn list_rooms(&self) -> Result<Vec<RoomName>, RepositoryError>;
}

/// 用户档案协作方。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 握手成功时写入/更新显示名；已有的 last_seen 保留。
    async fn upsert_profile(&self, profile: UserProfile) -> Result<(), RepositoryError>;

    async fn find(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError>;

    /// 断开连接时记录最后在线时间。
    async fn touch_last_seen(&self, id: UserId, at: Timestamp) -> Result<(), RepositoryError>;
}

/// 进程内实现（测试与免数据库运行）。
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;
    use uuid::Uuid;

    #[derive(Default)]
    pub struct MemoryMessageRepository {
        messages: RwLock<Vec<StoredMessage>>,
        store_calls: AtomicUsize,
    }

    impl MemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// `store` 被调用的次数，测试用来断言校验发生在持久化之前。
        pub fn store_calls(&self) -> usize {
            self.store_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageRepository for MemoryMessageRepository {
        async fn store(&self, message: NewMessage) -> Result<StoredMessage, RepositoryError> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            let stored = StoredMessage {
                id: MessageId::from(Uuid::new_v4()),
                sender_id: message.sender_id,
                content: message.content,
                target: message.target,
                created_at: chrono::Utc::now(),
            };
            self.messages.write().await.push(stored.clone());
            Ok(stored)
        }

        async fn fetch_recent(
            &self,
            target: &RoomTarget,
            limit: u32,
            before: Option<MessageId>,
        ) -> Result<Vec<StoredMessage>, RepositoryError> {
            let messages = self.messages.read().await;
            let scoped: Vec<&StoredMessage> =
                messages.iter().filter(|m| &m.target == target).collect();
            let end = match before {
                Some(id) => scoped
                    .iter()
                    .position(|m| m.id == id)
                    .ok_or(RepositoryError::NotFound)?,
                None => scoped.len(),
            };
            let start = end.saturating_sub(limit as usize);
            Ok(scoped[start..end].iter().map(|m| (*m).clone()).collect())
        }
    }

    #[derive(Default)]
    pub struct MemoryRoomMemberRepository {
        rooms: RwLock<HashMap<RoomName, HashSet<UserId>>>,
    }

    impl MemoryRoomMemberRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl RoomMemberRepository for MemoryRoomMemberRepository {
        async fn create_room(
            &self,
            name: RoomName,
            creator: UserId,
        ) -> Result<(), RepositoryError> {
            let mut rooms = self.rooms.write().await;
            if rooms.contains_key(&name) {
                return Err(RepositoryError::Conflict);
            }
            rooms.insert(name, HashSet::from([creator]));
            Ok(())
        }

        async fn join(&self, room: &RoomName, user: UserId) -> Result<(), RepositoryError> {
            let mut rooms = self.rooms.write().await;
            let members = rooms.get_mut(room).ok_or(RepositoryError::NotFound)?;
            members.insert(user);
            Ok(())
        }

        async fn is_member(&self, room: &RoomName, user: UserId) -> Result<bool, RepositoryError> {
            let rooms = self.rooms.read().await;
            let members = rooms.get(room).ok_or(RepositoryError::NotFound)?;
            Ok(members.contains(&user))
        }

        async fn list_member_ids(&self, room: &RoomName) -> Result<Vec<UserId>, RepositoryError> {
            let rooms = self.rooms.read().await;
            let members = rooms.get(room).ok_or(RepositoryError::NotFound)?;
            Ok(members.iter().copied().collect())
        }

        async fn list_rooms(&self) -> Result<Vec<RoomName>, RepositoryError> {
            let rooms = self.rooms.read().await;
            let mut names: Vec<RoomName> = rooms.keys().cloned().collect();
            names.sort();
            Ok(names)
        }
    }

    #[derive(Default)]
    pub struct MemoryUserRepository {
        users: RwLock<HashMap<UserId, UserProfile>>,
    }

    impl MemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl UserRepository for MemoryUserRepository {
        async fn upsert_profile(&self, profile: UserProfile) -> Result<(), RepositoryError> {
            let mut users = self.users.write().await;
            users
                .entry(profile.id)
                .and_modify(|existing| existing.display_name = profile.display_name.clone())
                .or_insert(profile);
            Ok(())
        }

        async fn find(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
            Ok(self.users.read().await.get(&id).cloned())
        }

        async fn touch_last_seen(
            &self,
            id: UserId,
            at: Timestamp,
        ) -> Result<(), RepositoryError> {
            let mut users = self.users.write().await;
            if let Some(profile) = users.get_mut(&id) {
                profile.last_seen = Some(at);
            }
            Ok(())
        }
    }
}
