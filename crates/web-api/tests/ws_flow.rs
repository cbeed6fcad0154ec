mod support;

use futures_util::SinkExt;
use reqwest::Client;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use uuid::Uuid;

use support::{connect_ws, next_event, spawn_server};

async fn send_json(ws: &mut support::WsClient, value: serde_json::Value) {
    ws.send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

#[tokio::test]
async fn chat_flow_over_websocket_and_rest() {
    let (addr, _shutdown) = spawn_server().await;
    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();

    let mut alice = connect_ws(addr, alice_id, "alice").await;
    let snapshot = next_event(&mut alice).await;
    assert_eq!(snapshot["event"], "online-users");
    assert_eq!(snapshot["data"].as_array().unwrap().len(), 1);

    let mut bob = connect_ws(addr, bob_id, "bob").await;
    let snapshot = next_event(&mut bob).await;
    assert_eq!(snapshot["event"], "online-users");
    assert_eq!(snapshot["data"].as_array().unwrap().len(), 2);

    let online = next_event(&mut alice).await;
    assert_eq!(online["event"], "user-online");
    assert_eq!(online["data"]["displayName"], "bob");

    // 全局消息到达包括发送者在内的所有在线用户
    send_json(
        &mut alice,
        json!({"event": "send-message", "data": {"content": "hello room"}}),
    )
    .await;

    let to_alice = next_event(&mut alice).await;
    let to_bob = next_event(&mut bob).await;
    for frame in [&to_alice, &to_bob] {
        assert_eq!(frame["event"], "new-message");
        assert_eq!(frame["data"]["content"], "hello room");
        assert_eq!(frame["data"]["room"], "global");
    }
    let message_id = to_alice["data"]["id"].as_str().unwrap().to_string();

    // 历史查询返回同一条消息
    let history: serde_json::Value = Client::new()
        .get(format!("http://{addr}/api/v1/rooms/global/messages"))
        .send()
        .await
        .expect("history request")
        .json()
        .await
        .expect("history json");
    let items = history.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"].as_str().unwrap(), message_id);

    // 输入状态通知不回送给输入者
    send_json(
        &mut bob,
        json!({"event": "typing-start", "data": {}}),
    )
    .await;
    let typing = next_event(&mut alice).await;
    assert_eq!(typing["event"], "user-typing");
    assert_eq!(typing["data"]["isTyping"], true);
    assert_eq!(typing["data"]["displayName"], "bob");

    // bob 的下一帧是消息而不是自己的输入状态
    send_json(
        &mut alice,
        json!({"event": "send-message", "data": {"content": "still there?"}}),
    )
    .await;
    let frame = next_event(&mut bob).await;
    assert_eq!(frame["event"], "new-message");

    // 断开触发下线广播
    drop(bob);
    loop {
        let frame = next_event(&mut alice).await;
        if frame["event"] == "user-offline" {
            assert_eq!(frame["data"]["displayName"], "bob");
            break;
        }
    }
}

#[tokio::test]
async fn private_messages_reach_only_the_two_parties() {
    let (addr, _shutdown) = spawn_server().await;
    let alice_id = Uuid::new_v4();
    let bob_id = Uuid::new_v4();
    let carol_id = Uuid::new_v4();

    let mut alice = connect_ws(addr, alice_id, "alice").await;
    let mut bob = connect_ws(addr, bob_id, "bob").await;
    let mut carol = connect_ws(addr, carol_id, "carol").await;

    // 丢弃连接期的快照和上线通知
    next_event(&mut alice).await;
    next_event(&mut alice).await;
    next_event(&mut alice).await;
    next_event(&mut bob).await;
    next_event(&mut bob).await;
    next_event(&mut carol).await;

    send_json(
        &mut alice,
        json!({
            "event": "send-private-message",
            "data": {"receiverId": bob_id, "content": "between us"}
        }),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let frame = next_event(ws).await;
        assert_eq!(frame["event"], "new-private-message");
        assert_eq!(frame["data"]["content"], "between us");
        assert_eq!(frame["data"]["receiverId"], bob_id.to_string());
    }

    // 第三方只会看到后续的全局消息，收不到私聊
    send_json(
        &mut alice,
        json!({"event": "send-message", "data": {"content": "public again"}}),
    )
    .await;
    let frame = next_event(&mut carol).await;
    assert_eq!(frame["event"], "new-message");

    // 私聊历史对两个参与者可见
    let history: serde_json::Value = Client::new()
        .get(format!(
            "http://{addr}/api/v1/messages/private?userId={bob_id}&peerId={alice_id}"
        ))
        .send()
        .await
        .expect("history request")
        .json()
        .await
        .expect("history json");
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_frame_yields_message_error() {
    let (addr, _shutdown) = spawn_server().await;
    let mut alice = connect_ws(addr, Uuid::new_v4(), "alice").await;
    next_event(&mut alice).await;

    alice
        .send(TungsteniteMessage::Text("not json".into()))
        .await
        .expect("send frame");

    let frame = next_event(&mut alice).await;
    assert_eq!(frame["event"], "message-error");
}

#[tokio::test]
async fn named_room_send_requires_membership() {
    let (addr, _shutdown) = spawn_server().await;
    let creator_id = Uuid::new_v4();
    let outsider_id = Uuid::new_v4();
    let client = Client::new();

    let created = client
        .post(format!("http://{addr}/api/v1/rooms"))
        .json(&json!({"name": "rust", "creatorId": creator_id}))
        .send()
        .await
        .expect("create room");
    assert_eq!(created.status(), 201);

    let mut outsider = connect_ws(addr, outsider_id, "mallory").await;
    next_event(&mut outsider).await;

    send_json(
        &mut outsider,
        json!({"event": "send-message", "data": {"content": "hi", "room": "rust"}}),
    )
    .await;
    let frame = next_event(&mut outsider).await;
    assert_eq!(frame["event"], "message-error");

    // 加入后发送成功
    let joined = client
        .post(format!("http://{addr}/api/v1/rooms/rust/members"))
        .json(&json!({"userId": outsider_id}))
        .send()
        .await
        .expect("join room");
    assert_eq!(joined.status(), 204);

    send_json(
        &mut outsider,
        json!({"event": "send-message", "data": {"content": "hi again", "room": "rust"}}),
    )
    .await;
    let frame = next_event(&mut outsider).await;
    assert_eq!(frame["event"], "new-message");
    assert_eq!(frame["data"]["room"], "rust");
}
