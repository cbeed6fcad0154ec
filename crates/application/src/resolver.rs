//! 房间成员解析器：把逻辑投递目标换算成接收者集合。
//!
//! 成员资格的裁决属于外部 CRUD 层，这里只信任其持久化结果，
//! 并把用户集合投影到当前在线的连接集合。

use std::collections::HashSet;
use std::sync::Arc;

use domain::{ConnectionId, DomainError, RepositoryError, RoomTarget, UserId};

use crate::error::ApplicationError;
use crate::registry::SessionRegistry;
use crate::repository::{RoomMemberRepository, UserRepository};

pub struct RoomMembershipResolver {
    members: Arc<dyn RoomMemberRepository>,
    users: Arc<dyn UserRepository>,
}

impl RoomMembershipResolver {
    pub fn new(members: Arc<dyn RoomMemberRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { members, users }
    }

    /// 目标范围的预期接收者集合。
    ///
    /// 全局范围即当前在线用户；命名房间为其持久化成员列表（与
    /// 在线状态无关）；私聊恰好是归一化后的两个参与者。
    pub async fn resolve(
        &self,
        target: &RoomTarget,
        registry: &SessionRegistry,
    ) -> Result<HashSet<UserId>, ApplicationError> {
        match target {
            RoomTarget::Global => Ok(registry.online_user_ids().collect()),
            RoomTarget::Named(name) => {
                let members = self.members.list_member_ids(name).await.map_err(|err| {
                    match err {
                        RepositoryError::NotFound => {
                            DomainError::room_not_found(name.as_str()).into()
                        }
                        other => ApplicationError::from(other),
                    }
                })?;
                Ok(members.into_iter().collect())
            }
            RoomTarget::Private { a, b } => Ok(HashSet::from([*a, *b])),
        }
    }

    /// 发送前的授权检查，必须在任何持久化调用之前执行。
    ///
    /// 命名房间要求发送者是成员（显式拒绝，而不是悄悄把发送者
    /// 排除在接收者之外）；私聊要求对端用户存在。
    pub async fn authorize_send(
        &self,
        target: &RoomTarget,
        sender: UserId,
    ) -> Result<(), ApplicationError> {
        match target {
            RoomTarget::Global => Ok(()),
            RoomTarget::Named(name) => {
                let is_member = self.members.is_member(name, sender).await.map_err(|err| {
                    match err {
                        RepositoryError::NotFound => {
                            DomainError::room_not_found(name.as_str()).into()
                        }
                        other => ApplicationError::from(other),
                    }
                })?;
                if is_member {
                    Ok(())
                } else {
                    Err(DomainError::not_a_member(name.as_str()).into())
                }
            }
            RoomTarget::Private { .. } => {
                let peer = target
                    .private_peer(sender)
                    .ok_or(DomainError::RecipientNotFound)?;
                match self.users.find(peer).await? {
                    Some(_) => Ok(()),
                    None => Err(DomainError::RecipientNotFound.into()),
                }
            }
        }
    }

    /// 用户集合到连接集合的投影；离线用户被静默丢弃，只能通过
    /// 之后的历史查询看到消息。
    pub fn to_connections(
        user_ids: &HashSet<UserId>,
        registry: &SessionRegistry,
    ) -> Vec<ConnectionId> {
        user_ids
            .iter()
            .filter_map(|user_id| registry.current_connection(*user_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::{MemoryRoomMemberRepository, MemoryUserRepository};
    use crate::repository::{MockRoomMemberRepository, MockUserRepository};
    use domain::{DisplayName, RoomName, UserProfile};
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    fn registry_with(users: &[(UserId, &str)]) -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        let now = chrono::Utc::now();
        for (user_id, name) in users {
            registry.register(
                *user_id,
                domain::ConnectionId::generate(),
                DisplayName::new(*name).unwrap(),
                now,
            );
        }
        registry
    }

    #[tokio::test]
    async fn global_resolves_to_online_users() {
        let alice = user();
        let bob = user();
        let resolver = RoomMembershipResolver::new(
            Arc::new(MemoryRoomMemberRepository::new()),
            Arc::new(MemoryUserRepository::new()),
        );
        let registry = registry_with(&[(alice, "alice"), (bob, "bob")]);

        let recipients = resolver
            .resolve(&RoomTarget::Global, &registry)
            .await
            .unwrap();
        assert_eq!(recipients, HashSet::from([alice, bob]));
    }

    #[tokio::test]
    async fn named_room_resolves_to_persisted_members() {
        let alice = user();
        let bob = user();
        let members = Arc::new(MemoryRoomMemberRepository::new());
        let room = RoomName::new("rust").unwrap();
        members.create_room(room.clone(), alice).await.unwrap();
        members.join(&room, bob).await.unwrap();

        let resolver =
            RoomMembershipResolver::new(members, Arc::new(MemoryUserRepository::new()));
        // 成员列表与在线状态无关
        let registry = registry_with(&[]);

        let recipients = resolver
            .resolve(&RoomTarget::Named(room), &registry)
            .await
            .unwrap();
        assert_eq!(recipients, HashSet::from([alice, bob]));
    }

    #[tokio::test]
    async fn non_member_send_is_rejected() {
        let alice = user();
        let outsider = user();
        let members = Arc::new(MemoryRoomMemberRepository::new());
        let room = RoomName::new("rust").unwrap();
        members.create_room(room.clone(), alice).await.unwrap();

        let resolver =
            RoomMembershipResolver::new(members, Arc::new(MemoryUserRepository::new()));

        let result = resolver
            .authorize_send(&RoomTarget::Named(room), outsider)
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::NotAMember { .. }))
        ));
    }

    #[tokio::test]
    async fn missing_room_maps_to_room_not_found() {
        let resolver = RoomMembershipResolver::new(
            Arc::new(MemoryRoomMemberRepository::new()),
            Arc::new(MemoryUserRepository::new()),
        );

        let target = RoomTarget::Named(RoomName::new("ghost").unwrap());
        let result = resolver.authorize_send(&target, user()).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::RoomNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn private_send_requires_known_recipient() {
        let alice = user();
        let bob = user();
        let users = Arc::new(MemoryUserRepository::new());
        users
            .upsert_profile(UserProfile::new(bob, DisplayName::new("bob").unwrap()))
            .await
            .unwrap();

        let resolver =
            RoomMembershipResolver::new(Arc::new(MemoryRoomMemberRepository::new()), users);

        resolver
            .authorize_send(&RoomTarget::private(alice, bob), alice)
            .await
            .unwrap();

        let stranger = user();
        let result = resolver
            .authorize_send(&RoomTarget::private(alice, stranger), alice)
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::RecipientNotFound))
        ));
    }

    #[tokio::test]
    async fn storage_failure_propagates_as_repository_error() {
        let mut members = MockRoomMemberRepository::new();
        members
            .expect_is_member()
            .returning(|_, _| Err(RepositoryError::storage("connection reset")));

        let resolver = RoomMembershipResolver::new(
            Arc::new(members),
            Arc::new(MockUserRepository::new()),
        );

        let target = RoomTarget::Named(RoomName::new("rust").unwrap());
        let result = resolver.authorize_send(&target, user()).await;
        assert!(matches!(result, Err(ApplicationError::Repository(_))));
    }

    #[tokio::test]
    async fn offline_users_are_dropped_from_connections() {
        let alice = user();
        let bob = user();
        let registry = registry_with(&[(alice, "alice")]);

        let connections =
            RoomMembershipResolver::to_connections(&HashSet::from([alice, bob]), &registry);
        assert_eq!(connections.len(), 1);
        assert_eq!(Some(connections[0]), registry.current_connection(alice));
    }
}
