//! Web API 层。
//!
//! 提供 Axum 路由：REST 查询接口与 WebSocket 连接网关，
//! 两者都把工作委托给应用层的 ChatHub 与持久化协作方。

mod error;
mod routes;
mod state;
mod ws;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
