//! 会话注册表：谁在线的唯一事实来源。
//!
//! 每个用户最多绑定一个活跃连接；同一用户的新连接在注册表中
//! 取代旧会话，旧传输不会被强制关闭，由其自身的关闭事件完成
//! 清理。注册表由 ChatHub 的调度任务独占持有，所有变更都在
//! 单一上下文中串行执行，因此不需要任何锁。

use std::collections::HashMap;

use domain::{ConnectionId, DisplayName, Timestamp, UserId};

use crate::events::OnlineUser;

/// 用户身份与当前连接的绑定。
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub display_name: DisplayName,
    pub authenticated_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<UserId, Session>,
    // connection_id -> user_id 反向索引；被取代的连接会被移出，
    // 其迟到的注销因此成为无操作
    by_connection: HashMap<ConnectionId, UserId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定用户到连接，返回被取代的会话（如果有）。
    ///
    /// 调用方必须已完成认证；注册表本身不重新校验身份。
    pub fn register(
        &mut self,
        user_id: UserId,
        connection_id: ConnectionId,
        display_name: DisplayName,
        now: Timestamp,
    ) -> Option<Session> {
        let session = Session {
            user_id,
            connection_id,
            display_name,
            authenticated_at: now,
        };
        let prior = self.sessions.insert(user_id, session);
        if let Some(prior) = &prior {
            self.by_connection.remove(&prior.connection_id);
        }
        self.by_connection.insert(connection_id, user_id);
        prior
    }

    /// 移除该连接持有的会话，仅当它仍是用户的当前连接。
    /// 被取代连接发来的过期注销返回 `None` 且不做任何修改。
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Session> {
        let user_id = self.by_connection.remove(&connection_id)?;
        self.sessions.remove(&user_id)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn session(&self, user_id: UserId) -> Option<&Session> {
        self.sessions.get(&user_id)
    }

    pub fn session_by_connection(&self, connection_id: ConnectionId) -> Option<&Session> {
        let user_id = self.by_connection.get(&connection_id)?;
        self.sessions.get(user_id)
    }

    pub fn current_connection(&self, user_id: UserId) -> Option<ConnectionId> {
        self.sessions.get(&user_id).map(|s| s.connection_id)
    }

    /// 调用时刻一致的在线快照，用于初始化新连接的客户端。
    pub fn online_users(&self) -> Vec<OnlineUser> {
        self.sessions.values().map(OnlineUser::from).collect()
    }

    pub fn online_user_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    fn conn() -> ConnectionId {
        ConnectionId::generate()
    }

    fn name(value: &str) -> DisplayName {
        DisplayName::new(value).unwrap()
    }

    #[test]
    fn register_marks_user_online() {
        let mut registry = SessionRegistry::new();
        let alice = user();
        assert!(!registry.is_online(alice));

        let prior = registry.register(alice, conn(), name("alice"), chrono::Utc::now());
        assert!(prior.is_none());
        assert!(registry.is_online(alice));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn second_connection_supersedes_session() {
        let mut registry = SessionRegistry::new();
        let alice = user();
        let first = conn();
        let second = conn();
        let now = chrono::Utc::now();

        registry.register(alice, first, name("alice"), now);
        let prior = registry.register(alice, second, name("alice"), now);

        assert_eq!(prior.unwrap().connection_id, first);
        assert_eq!(registry.current_connection(alice), Some(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_unregister_is_a_noop() {
        let mut registry = SessionRegistry::new();
        let alice = user();
        let first = conn();
        let second = conn();
        let now = chrono::Utc::now();

        registry.register(alice, first, name("alice"), now);
        registry.register(alice, second, name("alice"), now);

        // 被取代连接的注销不能把用户标记为离线
        assert!(registry.unregister(first).is_none());
        assert!(registry.is_online(alice));

        // 当前连接的注销才移除会话
        let removed = registry.unregister(second).unwrap();
        assert_eq!(removed.connection_id, second);
        assert!(!registry.is_online(alice));
    }

    #[test]
    fn snapshot_lists_all_sessions() {
        let mut registry = SessionRegistry::new();
        let now = chrono::Utc::now();
        registry.register(user(), conn(), name("alice"), now);
        registry.register(user(), conn(), name("bob"), now);

        let snapshot = registry.online_users();
        assert_eq!(snapshot.len(), 2);
    }
}
