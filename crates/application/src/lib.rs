//! 应用层实现。
//!
//! 实时分发核心：会话注册表、房间成员解析、在线/输入状态广播，
//! 以及把所有入站事件串行化处理的 ChatHub 调度任务。持久化
//! 协作方通过 trait 抽象，提供进程内与 PostgreSQL 两种实现。

pub mod clock;
pub mod error;
pub mod events;
pub mod fanout;
pub mod hub;
pub mod pg;
pub mod presence;
pub mod registry;
pub mod repository;
pub mod resolver;

pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use events::{
    ClientEvent, MessagePayload, OnlineUser, PrivateMessagePayload, ServerEvent, TypingPayload,
};
pub use fanout::ConnectionTable;
pub use hub::{ChatHub, HubDependencies, HubHandle};
pub use pg::{create_pg_pool, PgMessageRepository, PgRoomMemberRepository, PgUserRepository};
pub use presence::TypingTracker;
pub use registry::{Session, SessionRegistry};
pub use repository::{MessageRepository, RoomMemberRepository, UserRepository};
pub use resolver::RoomMembershipResolver;
