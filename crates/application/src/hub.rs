//! ChatHub：实时分发的单一调度任务。
//!
//! 注册表、输入状态表和出站连接表都由这个任务独占持有，所有
//! 入站事件通过命令队列串行处理。同一连接的事件按到达顺序
//! 处理，同一目标的投递顺序与持久化顺序一致，整个状态面不需
//! 要任何锁。
//!
//! 每条消息都先成功持久化、再广播；持久化失败时只给发送者回
//! 错误事件，不向任何接收者投递。

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use domain::{ConnectionId, DisplayName, DomainError, NewMessage, RoomTarget, UserId, UserProfile};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::events::{
    ClientEvent, MessagePayload, OnlineUser, PrivateMessagePayload, ServerEvent, TypingPayload,
};
use crate::fanout::ConnectionTable;
use crate::presence::TypingTracker;
use crate::registry::SessionRegistry;
use crate::repository::{MessageRepository, RoomMemberRepository, UserRepository};
use crate::resolver::RoomMembershipResolver;

/// 调度任务的外部协作方。
pub struct HubDependencies {
    pub messages: Arc<dyn MessageRepository>,
    pub rooms: Arc<dyn RoomMemberRepository>,
    pub users: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

enum HubCommand {
    Connect {
        user_id: UserId,
        display_name: DisplayName,
        connection_id: ConnectionId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Inbound {
        connection_id: ConnectionId,
        event: ClientEvent,
    },
    OnlineUsers {
        reply: oneshot::Sender<Vec<OnlineUser>>,
    },
}

/// 调度任务的克隆句柄，连接网关与 REST 层都通过它提交命令。
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// 把已认证的连接注册进调度任务。
    pub async fn connect(
        &self,
        user_id: UserId,
        display_name: DisplayName,
        connection_id: ConnectionId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.send(HubCommand::Connect {
            user_id,
            display_name,
            connection_id,
            outbound,
        })
        .await;
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.send(HubCommand::Disconnect { connection_id }).await;
    }

    /// 提交一个入站客户端事件；同一连接的事件按提交顺序处理。
    pub async fn submit(&self, connection_id: ConnectionId, event: ClientEvent) {
        self.send(HubCommand::Inbound {
            connection_id,
            event,
        })
        .await;
    }

    /// 当前在线用户快照。命令队列是 FIFO 的，因此返回时
    /// 之前提交的所有命令都已处理完毕。
    pub async fn online_users(&self) -> Vec<OnlineUser> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::OnlineUsers { reply }).await;
        rx.await.unwrap_or_default()
    }

    async fn send(&self, command: HubCommand) {
        if self.tx.send(command).await.is_err() {
            warn!("chat hub task is gone, command dropped");
        }
    }
}

/// 单一调度上下文：持有全部实时状态，串行消费命令队列。
pub struct ChatHub {
    registry: SessionRegistry,
    typing: TypingTracker,
    connections: ConnectionTable,
    resolver: RoomMembershipResolver,
    messages: Arc<dyn MessageRepository>,
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
}

impl ChatHub {
    /// 启动调度任务并返回其句柄。
    pub fn spawn(deps: HubDependencies, command_capacity: usize) -> HubHandle {
        let (tx, rx) = mpsc::channel(command_capacity);
        let hub = ChatHub {
            registry: SessionRegistry::new(),
            typing: TypingTracker::new(),
            connections: ConnectionTable::new(),
            resolver: RoomMembershipResolver::new(deps.rooms, Arc::clone(&deps.users)),
            messages: deps.messages,
            users: deps.users,
            clock: deps.clock,
        };
        tokio::spawn(hub.run(rx));
        HubHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        info!("chat hub dispatch task started");
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Connect {
                    user_id,
                    display_name,
                    connection_id,
                    outbound,
                } => {
                    self.handle_connect(user_id, display_name, connection_id, outbound)
                        .await;
                }
                HubCommand::Disconnect { connection_id } => {
                    self.handle_disconnect(connection_id).await;
                }
                HubCommand::Inbound {
                    connection_id,
                    event,
                } => {
                    self.handle_inbound(connection_id, event).await;
                }
                HubCommand::OnlineUsers { reply } => {
                    let _ = reply.send(self.registry.online_users());
                }
            }
        }
        info!("chat hub dispatch task stopped");
    }

    async fn handle_connect(
        &mut self,
        user_id: UserId,
        display_name: DisplayName,
        connection_id: ConnectionId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let now = self.clock.now();

        // 握手成功即登记档案，私聊的接收者校验依赖这张表
        if let Err(err) = self
            .users
            .upsert_profile(UserProfile::new(user_id, display_name.clone()))
            .await
        {
            warn!(user_id = %user_id, error = %err, "failed to upsert user profile");
        }

        let prior = self
            .registry
            .register(user_id, connection_id, display_name.clone(), now);
        if let Some(prior) = prior {
            // 旧传输不关闭，留在连接表里直到它自己断开；
            // 它发来的注销已被注册表识别为过期
            info!(
                user_id = %user_id,
                old_connection = %prior.connection_id,
                new_connection = %connection_id,
                "session superseded by new connection"
            );
        }
        self.connections.insert(connection_id, outbound);

        info!(user_id = %user_id, connection_id = %connection_id, "user connected");

        // 快照只发给新连接；上线通知发给其他所有人
        let snapshot = ServerEvent::OnlineUsers(self.registry.online_users());
        self.connections.send_to(connection_id, snapshot);

        if let Some(session) = self.registry.session(user_id) {
            let event = ServerEvent::UserOnline(OnlineUser::from(session));
            self.connections.broadcast_except(connection_id, &event);
        }
    }

    async fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        self.connections.remove(connection_id);

        // 被取代连接的迟到注销在这里变成无操作
        let Some(session) = self.registry.unregister(connection_id) else {
            debug!(connection_id = %connection_id, "stale disconnect ignored");
            return;
        };

        self.typing.clear_user(session.user_id);

        let now = self.clock.now();
        if let Err(err) = self.users.touch_last_seen(session.user_id, now).await {
            warn!(user_id = %session.user_id, error = %err, "failed to record last seen");
        }

        info!(user_id = %session.user_id, connection_id = %connection_id, "user disconnected");

        let event = ServerEvent::UserOffline(OnlineUser::from(&session));
        self.connections.broadcast_all(&event);
    }

    async fn handle_inbound(&mut self, connection_id: ConnectionId, event: ClientEvent) {
        // 被取代或从未注册的连接没有当前会话；回错误事件而不是
        // 静默丢弃，让旧传输上的发送方知道发送没有生效
        let Some(session) = self.registry.session_by_connection(connection_id) else {
            debug!(connection_id = %connection_id, "event from inactive connection rejected");
            self.connections.send_to(
                connection_id,
                ServerEvent::message_error("session is no longer active"),
            );
            return;
        };
        let sender_id = session.user_id;
        let sender_name = session.display_name.clone();

        match event {
            ClientEvent::SendMessage { content, room } => {
                if let Err(err) = self
                    .send_room_message(sender_id, content, room.as_deref())
                    .await
                {
                    warn!(user_id = %sender_id, error = %err, "room message rejected");
                    self.connections
                        .send_to(connection_id, ServerEvent::message_error(err.reason()));
                }
            }
            ClientEvent::SendPrivateMessage {
                receiver_id,
                content,
            } => {
                let receiver = UserId::from(receiver_id);
                if let Err(err) = self
                    .send_private_message(sender_id, connection_id, receiver, content)
                    .await
                {
                    warn!(user_id = %sender_id, error = %err, "private message rejected");
                    self.connections.send_to(
                        connection_id,
                        ServerEvent::private_message_error(err.reason()),
                    );
                }
            }
            ClientEvent::TypingStart { room } => {
                if let Err(err) = self
                    .set_typing(sender_id, sender_name, connection_id, room.as_deref(), true)
                    .await
                {
                    debug!(user_id = %sender_id, error = %err, "typing event rejected");
                    self.connections
                        .send_to(connection_id, ServerEvent::message_error(err.reason()));
                }
            }
            ClientEvent::TypingStop { room } => {
                if let Err(err) = self
                    .set_typing(sender_id, sender_name, connection_id, room.as_deref(), false)
                    .await
                {
                    debug!(user_id = %sender_id, error = %err, "typing event rejected");
                    self.connections
                        .send_to(connection_id, ServerEvent::message_error(err.reason()));
                }
            }
        }
    }

    /// 全局或命名房间消息：校验、授权、持久化、再广播，
    /// 任何一步失败都不会有接收者看到这条消息。
    async fn send_room_message(
        &mut self,
        sender_id: UserId,
        content: String,
        room: Option<&str>,
    ) -> Result<(), ApplicationError> {
        let target = RoomTarget::from_wire(room)?;
        let message = NewMessage::new(sender_id, content, target.clone())?;
        self.resolver.authorize_send(&target, sender_id).await?;

        let stored = self.messages.store(message).await?;
        debug!(message_id = %stored.id, target = %target, "message persisted");

        let payload = MessagePayload::from_stored(&stored)
            .ok_or(DomainError::RecipientNotFound)?;
        let event = ServerEvent::NewMessage(payload);

        match &target {
            // 全局房间包含发送者在内的所有在线连接
            RoomTarget::Global => self.connections.broadcast_all(&event),
            _ => {
                let recipients = self.resolver.resolve(&target, &self.registry).await?;
                let connections =
                    RoomMembershipResolver::to_connections(&recipients, &self.registry);
                self.connections.fanout(connections, &event);
            }
        }
        Ok(())
    }

    /// 私聊消息：持久化后回显给发送者，接收者在线时再投递一次。
    async fn send_private_message(
        &mut self,
        sender_id: UserId,
        connection_id: ConnectionId,
        receiver_id: UserId,
        content: String,
    ) -> Result<(), ApplicationError> {
        let target = RoomTarget::private(sender_id, receiver_id);
        let message = NewMessage::new(sender_id, content, target.clone())?;
        self.resolver.authorize_send(&target, sender_id).await?;

        let stored = self.messages.store(message).await?;
        debug!(message_id = %stored.id, target = %target, "private message persisted");

        let payload = PrivateMessagePayload::from_stored(&stored)
            .ok_or(DomainError::RecipientNotFound)?;
        let event = ServerEvent::NewPrivateMessage(payload);

        // 回显发送者当前连接；自聊时只投递这一次
        self.connections.send_to(connection_id, event.clone());
        if receiver_id != sender_id {
            if let Some(receiver_conn) = self.registry.current_connection(receiver_id) {
                self.connections.send_to(receiver_conn, event);
            }
        }
        Ok(())
    }

    /// 输入状态是临时信号：不持久化，最后写入胜出，
    /// 通知范围内除发送者外的在线成员。
    async fn set_typing(
        &mut self,
        sender_id: UserId,
        sender_name: DisplayName,
        connection_id: ConnectionId,
        room: Option<&str>,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        let target = RoomTarget::from_wire(room)?;
        self.typing.set(sender_id, target.clone(), is_typing);

        let event = ServerEvent::UserTyping(TypingPayload {
            user_id: sender_id.into(),
            display_name: sender_name.as_str().to_string(),
            is_typing,
        });

        match &target {
            RoomTarget::Global => self.connections.broadcast_except(connection_id, &event),
            _ => {
                let recipients = self.resolver.resolve(&target, &self.registry).await?;
                let connections =
                    RoomMembershipResolver::to_connections(&recipients, &self.registry)
                        .into_iter()
                        .filter(|c| *c != connection_id);
                self.connections.fanout(connections, &event);
            }
        }
        Ok(())
    }
}
