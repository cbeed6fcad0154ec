//! 输入状态表。
//!
//! 每个 (用户, 目标) 一个临时标记，最后写入胜出，不做持久化。
//! 服务端不主动过期陈旧的 `true`，由发送客户端的防抖逻辑负责
//! 发出 stop 事件。连接断开时立即清理。

use std::collections::HashMap;

use domain::{RoomTarget, UserId};

#[derive(Debug, Default)]
pub struct TypingTracker {
    states: HashMap<(UserId, RoomTarget), bool>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最后写入胜出；`false` 直接移除条目，避免表无界增长。
    pub fn set(&mut self, user_id: UserId, target: RoomTarget, is_typing: bool) {
        if is_typing {
            self.states.insert((user_id, target), true);
        } else {
            self.states.remove(&(user_id, target));
        }
    }

    pub fn is_typing(&self, user_id: UserId, target: &RoomTarget) -> bool {
        self.states
            .get(&(user_id, target.clone()))
            .copied()
            .unwrap_or(false)
    }

    /// 断开连接时清除该用户的全部输入状态。
    pub fn clear_user(&mut self, user_id: UserId) {
        self.states.retain(|(owner, _), _| *owner != user_id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    #[test]
    fn last_write_wins() {
        let mut tracker = TypingTracker::new();
        let alice = user();

        tracker.set(alice, RoomTarget::Global, true);
        assert!(tracker.is_typing(alice, &RoomTarget::Global));

        tracker.set(alice, RoomTarget::Global, false);
        assert!(!tracker.is_typing(alice, &RoomTarget::Global));
        assert!(tracker.is_empty());
    }

    #[test]
    fn targets_are_tracked_independently() {
        let mut tracker = TypingTracker::new();
        let alice = user();
        let bob = user();
        let private = RoomTarget::private(alice, bob);

        tracker.set(alice, RoomTarget::Global, true);
        tracker.set(alice, private.clone(), true);

        tracker.set(alice, RoomTarget::Global, false);
        assert!(tracker.is_typing(alice, &private));
    }

    #[test]
    fn clear_user_removes_every_entry() {
        let mut tracker = TypingTracker::new();
        let alice = user();
        let bob = user();

        tracker.set(alice, RoomTarget::Global, true);
        tracker.set(alice, RoomTarget::private(alice, bob), true);
        tracker.set(bob, RoomTarget::Global, true);

        tracker.clear_user(alice);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_typing(bob, &RoomTarget::Global));
    }
}
