//! 主应用程序入口
//!
//! 启动聊天服务：加载配置，准备持久化层，启动 ChatHub 调度
//! 任务，然后对外提供 Axum 路由。

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use application::repository::memory::{
    MemoryMessageRepository, MemoryRoomMemberRepository, MemoryUserRepository,
};
use application::{
    create_pg_pool, ChatHub, HubDependencies, MessageRepository, PgMessageRepository,
    PgRoomMemberRepository, PgUserRepository, RoomMemberRepository, SystemClock, UserRepository,
};
use config::AppConfig;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;

    let (messages, rooms, users): (
        Arc<dyn MessageRepository>,
        Arc<dyn RoomMemberRepository>,
        Arc<dyn UserRepository>,
    ) = match &config.database.url {
        Some(database_url) => {
            tracing::info!(
                database = %database_url.split('@').next_back().unwrap_or("unknown"),
                "connecting to postgres"
            );
            let pool = Arc::new(
                create_pg_pool(database_url, config.database.max_connections).await?,
            );
            sqlx::migrate!("../../migrations").run(&*pool).await?;
            (
                Arc::new(PgMessageRepository::new(Arc::clone(&pool))),
                Arc::new(PgRoomMemberRepository::new(Arc::clone(&pool))),
                Arc::new(PgUserRepository::new(pool)),
            )
        }
        None => {
            // 没有数据库时用进程内存储，重启即丢失
            tracing::warn!("no database configured, falling back to in-memory storage");
            (
                Arc::new(MemoryMessageRepository::new()),
                Arc::new(MemoryRoomMemberRepository::new()),
                Arc::new(MemoryUserRepository::new()),
            )
        }
    };

    let hub = ChatHub::spawn(
        HubDependencies {
            messages: Arc::clone(&messages),
            rooms: Arc::clone(&rooms),
            users: Arc::clone(&users),
            clock: Arc::new(SystemClock),
        },
        config.gateway.command_capacity,
    );

    let state = AppState::new(
        hub,
        messages,
        rooms,
        users,
        config.gateway.history_page_limit,
    );
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "chat server listening");

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
