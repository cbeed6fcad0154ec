//! PostgreSQL 持久化实现。
//!
//! 消息的目标用两列互斥编码：房间消息写 `room`（全局房间即
//! "global"），私聊消息写 `receiver_id`。读取时还原成
//! `RoomTarget`，私聊对由 (sender, receiver) 重新归一化。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, query_as, FromRow, PgPool, Row};
use uuid::Uuid;

use domain::{
    MessageContent, MessageId, NewMessage, RepositoryError, RoomName, RoomTarget, StoredMessage,
    Timestamp, UserId, UserProfile,
};

use crate::repository::{MessageRepository, RoomMemberRepository, UserRepository};

/// 创建数据库连接池。
pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

fn storage(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

/// 数据库消息行。
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    id: Uuid,
    sender_id: Uuid,
    content: String,
    room: Option<String>,
    receiver_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl DbMessage {
    fn into_stored(self) -> Result<StoredMessage, RepositoryError> {
        let sender_id = UserId::from(self.sender_id);
        let target = match (self.room.as_deref(), self.receiver_id) {
            (Some(room), None) => RoomTarget::from_wire(Some(room))
                .map_err(|e| RepositoryError::storage(format!("corrupt room column: {e}")))?,
            (None, Some(receiver)) => RoomTarget::private(sender_id, UserId::from(receiver)),
            _ => {
                return Err(RepositoryError::storage(
                    "message row has neither room nor receiver",
                ))
            }
        };
        let content = MessageContent::new(self.content)
            .map_err(|e| RepositoryError::storage(format!("corrupt content column: {e}")))?;
        Ok(StoredMessage {
            id: MessageId::from(self.id),
            sender_id,
            content,
            target,
            created_at: self.created_at,
        })
    }
}

/// 目标到两列编码的拆解。
fn target_columns(sender: UserId, target: &RoomTarget) -> (Option<String>, Option<Uuid>) {
    match target {
        RoomTarget::Private { .. } => {
            // 编码对端而不是归一化对，读取时按发送者还原
            let receiver = target.private_peer(sender).map(Uuid::from);
            (None, receiver)
        }
        other => (other.wire_room().map(str::to_string), None),
    }
}

pub struct PgMessageRepository {
    pool: Arc<PgPool>,
}

impl PgMessageRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 按目标范围的 WHERE 片段与绑定值。
    fn target_filter(target: &RoomTarget) -> (&'static str, Vec<Uuid>, Option<String>) {
        match target {
            RoomTarget::Private { a, b } => (
                "room IS NULL AND ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))",
                vec![Uuid::from(*a), Uuid::from(*b)],
                None,
            ),
            other => (
                "room = $1",
                Vec::new(),
                other.wire_room().map(str::to_string),
            ),
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn store(&self, message: NewMessage) -> Result<StoredMessage, RepositoryError> {
        let id = Uuid::new_v4();
        let (room, receiver_id) = target_columns(message.sender_id, &message.target);

        let row = query_as::<_, DbMessage>(
            r#"
            INSERT INTO messages (id, sender_id, content, room, receiver_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, sender_id, content, room, receiver_id, created_at
            "#,
        )
        .bind(id)
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(room)
        .bind(receiver_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(storage)?;

        row.into_stored()
    }

    async fn fetch_recent(
        &self,
        target: &RoomTarget,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let (filter, user_binds, room_bind) = Self::target_filter(target);
        let next = user_binds.len() + room_bind.iter().count() + 1;

        // before 给定时以锚点行的 (created_at, id) 为上界
        let anchor = match before {
            Some(id) => {
                let row = query("SELECT created_at, id FROM messages WHERE id = $1")
                    .bind(Uuid::from(id))
                    .fetch_optional(&*self.pool)
                    .await
                    .map_err(storage)?
                    .ok_or(RepositoryError::NotFound)?;
                let created_at: DateTime<Utc> = row.get(0);
                let id: Uuid = row.get(1);
                Some((created_at, id))
            }
            None => None,
        };

        let sql = match anchor {
            Some(_) => format!(
                "SELECT id, sender_id, content, room, receiver_id, created_at FROM messages \
                 WHERE {filter} AND (created_at, id) < (${next}, ${next_id}) \
                 ORDER BY created_at DESC, id DESC LIMIT ${limit_pos}",
                next_id = next + 1,
                limit_pos = next + 2,
            ),
            None => format!(
                "SELECT id, sender_id, content, room, receiver_id, created_at FROM messages \
                 WHERE {filter} ORDER BY created_at DESC, id DESC LIMIT ${next}"
            ),
        };

        let mut q = query_as::<_, DbMessage>(&sql);
        for bind in &user_binds {
            q = q.bind(*bind);
        }
        if let Some(room) = &room_bind {
            q = q.bind(room);
        }
        if let Some((created_at, id)) = anchor {
            q = q.bind(created_at).bind(id);
        }
        let rows = q
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(storage)?;

        // 窗口按时间升序返回
        let mut messages = rows
            .into_iter()
            .map(DbMessage::into_stored)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

pub struct PgRoomMemberRepository {
    pool: Arc<PgPool>,
}

impl PgRoomMemberRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomMemberRepository for PgRoomMemberRepository {
    async fn create_room(&self, name: RoomName, creator: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let result = query("INSERT INTO rooms (name, created_by) VALUES ($1, $2)")
            .bind(name.as_str())
            .bind(Uuid::from(creator))
            .execute(&mut *tx)
            .await;
        if let Err(err) = result {
            if let sqlx::Error::Database(db_err) = &err {
                if db_err.is_unique_violation() {
                    return Err(RepositoryError::Conflict);
                }
            }
            return Err(storage(err));
        }

        // 创建者自动成为成员
        query("INSERT INTO room_members (room_name, user_id) VALUES ($1, $2)")
            .bind(name.as_str())
            .bind(Uuid::from(creator))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)
    }

    async fn join(&self, room: &RoomName, user: UserId) -> Result<(), RepositoryError> {
        let result = query(
            "INSERT INTO room_members (room_name, user_id) VALUES ($1, $2) \
             ON CONFLICT (room_name, user_id) DO NOTHING",
        )
        .bind(room.as_str())
        .bind(Uuid::from(user))
        .execute(&*self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                if let sqlx::Error::Database(db_err) = &err {
                    if db_err.is_foreign_key_violation() {
                        return Err(RepositoryError::NotFound);
                    }
                }
                Err(storage(err))
            }
        }
    }

    async fn is_member(&self, room: &RoomName, user: UserId) -> Result<bool, RepositoryError> {
        let row = query(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM rooms WHERE name = $1) AS room_exists,
                EXISTS(SELECT 1 FROM room_members WHERE room_name = $1 AND user_id = $2) AS is_member
            "#,
        )
        .bind(room.as_str())
        .bind(Uuid::from(user))
        .fetch_one(&*self.pool)
        .await
        .map_err(storage)?;

        let room_exists: bool = row.get("room_exists");
        if !room_exists {
            return Err(RepositoryError::NotFound);
        }
        Ok(row.get("is_member"))
    }

    async fn list_member_ids(&self, room: &RoomName) -> Result<Vec<UserId>, RepositoryError> {
        let room_exists: bool = query("SELECT EXISTS(SELECT 1 FROM rooms WHERE name = $1)")
            .bind(room.as_str())
            .fetch_one(&*self.pool)
            .await
            .map_err(storage)?
            .get(0);
        if !room_exists {
            return Err(RepositoryError::NotFound);
        }

        let rows = query("SELECT user_id FROM room_members WHERE room_name = $1")
            .bind(room.as_str())
            .fetch_all(&*self.pool)
            .await
            .map_err(storage)?;
        Ok(rows
            .into_iter()
            .map(|row| UserId::from(row.get::<Uuid, _>("user_id")))
            .collect())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomName>, RepositoryError> {
        let rows = query("SELECT name FROM rooms ORDER BY name")
            .fetch_all(&*self.pool)
            .await
            .map_err(storage)?;
        rows.into_iter()
            .map(|row| {
                RoomName::new(row.get::<String, _>("name"))
                    .map_err(|e| RepositoryError::storage(format!("corrupt room name: {e}")))
            })
            .collect()
    }
}

/// 数据库用户行。
#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    display_name: String,
    last_seen: Option<DateTime<Utc>>,
}

impl DbUser {
    fn into_profile(self) -> Result<UserProfile, RepositoryError> {
        let display_name = domain::DisplayName::new(self.display_name)
            .map_err(|e| RepositoryError::storage(format!("corrupt display name: {e}")))?;
        Ok(UserProfile {
            id: UserId::from(self.id),
            display_name,
            last_seen: self.last_seen,
        })
    }
}

pub struct PgUserRepository {
    pool: Arc<PgPool>,
}

impl PgUserRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn upsert_profile(&self, profile: UserProfile) -> Result<(), RepositoryError> {
        // 重连时只刷新显示名，last_seen 保留
        query(
            r#"
            INSERT INTO users (id, display_name) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name
            "#,
        )
        .bind(Uuid::from(profile.id))
        .bind(profile.display_name.as_str())
        .execute(&*self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn find(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let row = query_as::<_, DbUser>(
            "SELECT id, display_name, last_seen FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage)?;
        row.map(DbUser::into_profile).transpose()
    }

    async fn touch_last_seen(&self, id: UserId, at: Timestamp) -> Result<(), RepositoryError> {
        query("UPDATE users SET last_seen = $2 WHERE id = $1")
            .bind(Uuid::from(id))
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}
