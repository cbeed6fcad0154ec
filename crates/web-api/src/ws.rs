//! WebSocket 连接网关。
//!
//! 升级前做认证检查（只校验令牌是否存在，生产环境应替换为
//! JWT 验证），升级后把连接注册进 ChatHub 并在收发两个任务
//! 之间转发：入站帧解析为客户端事件提交给调度队列，出站事件
//! 序列化后写回套接字。连接关闭时向调度队列提交注销命令，
//! 过期注销由注册表自行识别。

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use application::{ClientEvent, HubHandle, ServerEvent};
use domain::{ConnectionId, DisplayName, UserId};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WsQuery {
    token: Option<String>,
    user_id: Option<Uuid>,
    display_name: Option<String>,
}

pub(crate) async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // 令牌或用户标识缺失的连接在升级前统一拒绝
    if query.token.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("websocket upgrade rejected: missing token");
        return Err(ApiError::unauthorized("authentication token missing"));
    }
    let Some(user_id) = query.user_id else {
        tracing::warn!("websocket upgrade rejected: missing user id");
        return Err(ApiError::unauthorized("user id missing"));
    };

    let display_name = DisplayName::new(
        query
            .display_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
    )
    .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let user_id = UserId::from(user_id);
    Ok(ws.on_upgrade(move |socket| websocket_handler(socket, state, user_id, display_name)))
}

/// WebSocket 写操作命令，统一管理对 sender 的所有写入。
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

async fn websocket_handler(
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
    display_name: DisplayName,
) {
    let connection_id = ConnectionId::generate();
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "websocket connection established");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
    state
        .hub
        .connect(user_id, display_name, connection_id, outbound_tx)
        .await;

    let (mut sender, mut incoming) = socket.split();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

    // 发送任务：出站事件序列化后与 pong 一起经同一条命令通道写出
    let send_task = {
        let cmd_tx = cmd_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break };
                        let message = match cmd {
                            WsCommand::SendText(text) => WsMessage::Text(text.into()),
                            WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                        };
                        if sender.send(message).await.is_err() {
                            tracing::debug!("websocket send failed, closing send task");
                            break;
                        }
                    }
                    event = outbound_rx.recv() => {
                        let Some(event) = event else { break };
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize websocket payload");
                                continue;
                            }
                        };
                        if cmd_tx.send(WsCommand::SendText(payload)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    };

    // 接收任务：解析入站帧并提交给调度队列
    let recv_task = {
        let hub = state.hub.clone();
        tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if handle_incoming(message, &hub, connection_id, &cmd_tx)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        })
    };

    // 任一任务结束即认为连接断开
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.hub.disconnect(connection_id).await;
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "websocket connection closed");
}

async fn handle_incoming(
    message: WsMessage,
    hub: &HubHandle,
    connection_id: ConnectionId,
    cmd_tx: &mpsc::Sender<WsCommand>,
) -> Result<(), ()> {
    match message {
        WsMessage::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "websocket close frame received");
            return Err(());
        }
        WsMessage::Ping(data) => {
            if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                return Err(());
            }
        }
        WsMessage::Pong(_) => {}
        WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => hub.submit(connection_id, event).await,
            Err(err) => {
                // 畸形帧只影响发送它的连接
                tracing::debug!(connection_id = %connection_id, error = %err, "malformed frame");
                let reply = ServerEvent::message_error("malformed event frame");
                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        if cmd_tx.send(WsCommand::SendText(json)).await.is_err() {
                            return Err(());
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize error reply");
                    }
                }
            }
        },
        WsMessage::Binary(_) => {
            tracing::debug!(connection_id = %connection_id, "binary frame ignored");
        }
    }
    Ok(())
}
