use std::ops::ControlFlow;

use application::{ClientEvent, EventReceiver, Session};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::Identity;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// 单个 WebSocket 连接的执行体。
///
/// 入站事件在当前任务里逐个处理，保证同一连接内的顺序；
/// 出站事件由独立的发送任务写回客户端。
pub struct WebSocketConnection {
    state: AppState,
    identity: Identity,
}

impl WebSocketConnection {
    pub fn new(state: AppState, identity: Identity) -> Self {
        Self { state, identity }
    }

    pub async fn run(self, socket: WebSocket) {
        let Self { state, identity } = self;
        let (session, outbound) = state.chat_service.connect(identity).await;
        let (mut sender, mut incoming) = socket.split();

        // 发送任务之外的写操作（目前只有 pong）经由这个通道
        let (cmd_tx, cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            pump_outbound(&mut sender, outbound, cmd_rx).await;
            let _ = sender.close().await;
        });

        let recv_loop = async {
            while let Some(frame) = incoming.next().await {
                let message = match frame {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::debug!(error = %err, "websocket read failed");
                        break;
                    }
                };
                if handle_incoming(&state, &session, message, &cmd_tx)
                    .await
                    .is_break()
                {
                    break;
                }
            }
        };

        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(connection_id = %session.connection_id(), "send task finished");
            }
            _ = recv_loop => {
                tracing::debug!(connection_id = %session.connection_id(), "receive loop finished");
            }
        }
        send_task.abort();

        state.chat_service.disconnect(session).await;
    }
}

/// 发送任务的写命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}

async fn pump_outbound<S>(
    sender: &mut S,
    mut outbound: EventReceiver,
    mut cmd_rx: mpsc::Receiver<WsCommand>,
) where
    S: SinkExt<WsMessage> + Unpin,
{
    loop {
        let message = tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => WsMessage::Text(json.into()),
                    Err(err) => {
                        tracing::warn!(event = event.name(), error = %err, "failed to serialize event");
                        continue;
                    }
                }
            }
            Some(cmd) = cmd_rx.recv() => match cmd {
                WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
            },
        };

        if sender.send(message).await.is_err() {
            tracing::debug!("websocket write failed");
            break;
        }
    }
}

async fn handle_incoming(
    state: &AppState,
    session: &Session,
    message: WsMessage,
    cmd_tx: &mpsc::Sender<WsCommand>,
) -> ControlFlow<()> {
    match message {
        WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => state.chat_service.handle(session, event).await,
            Err(err) => {
                tracing::debug!(
                    connection_id = %session.connection_id(),
                    error = %err,
                    "ignoring malformed frame"
                );
            }
        },
        WsMessage::Binary(_) => {
            tracing::debug!(connection_id = %session.connection_id(), "ignoring binary frame");
        }
        WsMessage::Ping(data) => {
            if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                return ControlFlow::Break(());
            }
        }
        WsMessage::Pong(_) => {}
        WsMessage::Close(_) => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}
