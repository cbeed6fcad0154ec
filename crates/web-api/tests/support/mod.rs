use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use application::repository::memory::{
    MemoryMessageRepository, MemoryRoomMemberRepository, MemoryUserRepository,
};
use application::{ChatHub, HubDependencies, SystemClock};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn build_router() -> Router {
    let messages = Arc::new(MemoryMessageRepository::new());
    let rooms = Arc::new(MemoryRoomMemberRepository::new());
    let users = Arc::new(MemoryUserRepository::new());
    let hub = ChatHub::spawn(
        HubDependencies {
            messages: Arc::clone(&messages) as _,
            rooms: Arc::clone(&rooms) as _,
            users: Arc::clone(&users) as _,
            clock: Arc::new(SystemClock),
        },
        64,
    );
    router(AppState::new(hub, messages, rooms, users, 50))
}

/// 在随机端口上启动服务，返回地址与关停句柄。
pub async fn spawn_server() -> (SocketAddr, oneshot::Sender<()>) {
    let app = build_router();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    (addr, shutdown_tx)
}

pub fn ws_url(addr: SocketAddr, user_id: Uuid, display_name: &str) -> String {
    format!(
        "ws://{addr}/api/v1/ws?token=test-token&userId={user_id}&displayName={display_name}"
    )
}

pub async fn connect_ws(addr: SocketAddr, user_id: Uuid, display_name: &str) -> WsClient {
    let (ws, _) = connect_async(ws_url(addr, user_id, display_name))
        .await
        .expect("websocket connect");
    ws
}

/// 下一个文本帧解析出的事件，2 秒内未到达视为失败。
pub async fn next_event(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("valid event json");
        }
    }
}
