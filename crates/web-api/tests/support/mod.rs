#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use config::{AppConfig, MEMORY_DATABASE_URL};
use futures_util::{SinkExt, StreamExt};
use infrastructure::Infrastructure;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    _shutdown: oneshot::Sender<()>,
}

/// 在随机端口启动一个使用内存存储、已写入演示数据的服务
pub async fn spawn_server() -> TestServer {
    let mut config = AppConfig::default();
    config.database.url = MEMORY_DATABASE_URL.to_string();
    config.security.bcrypt_cost = 4;

    let infrastructure = Infrastructure::connect(&config)
        .await
        .expect("in-memory infrastructure");
    let app = router(AppState::from_config(&config, infrastructure));

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

    TestServer {
        addr,
        client: Client::new(),
        _shutdown: shutdown_tx,
    }
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.http("/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("login request")
    }

    pub async fn token_for(&self, username: &str, password: &str) -> String {
        let body: Value = self
            .login(username, password)
            .await
            .json()
            .await
            .expect("login json");
        body["token"].as_str().expect("token in response").to_string()
    }

    pub async fn connect(&self, token: &str) -> WsStream {
        let url = format!("ws://{}/ws?token={}", self.addr, token);
        let (ws, _) = connect_async(url).await.expect("websocket connect");
        ws
    }
}

pub async fn send_event(ws: &mut WsStream, event: &str, data: Value) {
    let frame = if data.is_null() {
        json!({ "event": event })
    } else {
        json!({ "event": event, "data": data })
    };
    ws.send(TungsteniteMessage::text(frame.to_string()))
        .await
        .expect("send frame");
}

/// 读取下一个 JSON 事件帧
pub async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream closed")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

/// 跳过其他事件，直到收到指定名称的事件，返回其 data
pub async fn expect_event(ws: &mut WsStream, name: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["event"] == name {
            return event["data"].clone();
        }
    }
}

/// 在给定时间内没有收到指定事件
pub async fn assert_no_event(ws: &mut WsStream, name: &str, within: Duration) {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(TungsteniteMessage::Text(text)))) => {
                let event: Value = serde_json::from_str(text.as_str()).expect("json frame");
                assert_ne!(event["event"], name, "unexpected {name}: {event}");
            }
            Ok(Some(Ok(_))) => {}
            Ok(_) => return,
        }
    }
}
