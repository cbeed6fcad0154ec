//! 出站连接表：把一个事件投递到计算出的接收连接集合。
//!
//! 表由 ChatHub 的调度任务独占持有。向单个接收者的写入失败
//! 只记录日志，不中断对其余接收者的投递；失败的连接等同于已
//! 断开，由它自己的关闭事件触发注册表清理。

use std::collections::HashMap;

use domain::ConnectionId;
use tokio::sync::mpsc;

use crate::events::ServerEvent;

#[derive(Debug, Default)]
pub struct ConnectionTable {
    senders: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.senders.insert(connection_id, sender);
    }

    pub fn remove(&mut self, connection_id: ConnectionId) {
        self.senders.remove(&connection_id);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// 点对点推送；返回 false 表示该连接的出站通道已关闭。
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let Some(sender) = self.senders.get(&connection_id) else {
            tracing::debug!(connection_id = %connection_id, "outbound channel missing, event dropped");
            return false;
        };
        if sender.send(event).is_err() {
            tracing::warn!(connection_id = %connection_id, "outbound channel closed, event dropped");
            return false;
        }
        true
    }

    /// 投递到给定连接集合；逐个克隆事件，失败的接收者被跳过。
    pub fn fanout(&self, targets: impl IntoIterator<Item = ConnectionId>, event: &ServerEvent) {
        for connection_id in targets {
            self.send_to(connection_id, event.clone());
        }
    }

    /// 广播给除指定连接外的所有连接（全局在线范围）。
    pub fn broadcast_except(&self, skip: ConnectionId, event: &ServerEvent) {
        for (connection_id, sender) in &self.senders {
            if *connection_id == skip {
                continue;
            }
            if sender.send(event.clone()).is_err() {
                tracing::warn!(connection_id = %connection_id, "outbound channel closed, event dropped");
            }
        }
    }

    /// 广播给所有连接。
    pub fn broadcast_all(&self, event: &ServerEvent) {
        for (connection_id, sender) in &self.senders {
            if sender.send(event.clone()).is_err() {
                tracing::warn!(connection_id = %connection_id, "outbound channel closed, event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OnlineUser;
    use uuid::Uuid;

    fn online(name: &str) -> ServerEvent {
        ServerEvent::UserOnline(OnlineUser {
            user_id: Uuid::new_v4(),
            display_name: name.to_string(),
        })
    }

    #[test]
    fn failed_recipient_does_not_abort_fanout() {
        let mut table = ConnectionTable::new();
        let dead = ConnectionId::generate();
        let live = ConnectionId::generate();

        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        table.insert(dead, dead_tx);
        table.insert(live, live_tx);
        drop(dead_rx);

        table.fanout([dead, live], &online("alice"));
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn broadcast_except_skips_origin() {
        let mut table = ConnectionTable::new();
        let origin = ConnectionId::generate();
        let other = ConnectionId::generate();

        let (origin_tx, mut origin_rx) = mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        table.insert(origin, origin_tx);
        table.insert(other, other_tx);

        table.broadcast_except(origin, &online("bob"));
        assert!(origin_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_ok());
    }
}
