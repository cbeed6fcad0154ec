use std::sync::Arc;

use application::{HubHandle, MessageRepository, RoomMemberRepository, UserRepository};

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub messages: Arc<dyn MessageRepository>,
    pub rooms: Arc<dyn RoomMemberRepository>,
    pub users: Arc<dyn UserRepository>,
    /// 历史查询单页上限。
    pub history_page_limit: u32,
}

impl AppState {
    pub fn new(
        hub: HubHandle,
        messages: Arc<dyn MessageRepository>,
        rooms: Arc<dyn RoomMemberRepository>,
        users: Arc<dyn UserRepository>,
        history_page_limit: u32,
    ) -> Self {
        Self {
            hub,
            messages,
            rooms,
            users,
            history_page_limit,
        }
    }
}
