use std::collections::HashMap;
use std::sync::Arc;

use domain::ConnectionId;
use tokio::sync::{mpsc, RwLock};

use crate::events::ServerEvent;

pub type EventReceiver = mpsc::Receiver<ServerEvent>;

/// 所有在线连接的出站队列。
///
/// 每个连接一个有界队列，投递使用 `try_send`：队列满或连接已关闭时事件被丢弃，
/// 慢客户端不会拖住其他连接。
#[derive(Clone)]
pub struct ConnectionHub {
    senders: Arc<RwLock<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>>,
    buffer: usize,
}

impl ConnectionHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    /// 注册连接并返回它的出站接收端
    pub async fn register(&self, connection_id: ConnectionId) -> EventReceiver {
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.senders.write().await.insert(connection_id, sender);
        receiver
    }

    pub async fn unregister(&self, connection_id: ConnectionId) -> bool {
        self.senders.write().await.remove(&connection_id).is_some()
    }

    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let senders = self.senders.read().await;
        match senders.get(&connection_id) {
            Some(sender) => deliver(connection_id, sender, event),
            None => false,
        }
    }

    /// 返回成功入队的连接数
    pub async fn send_to_many(&self, targets: &[ConnectionId], event: &ServerEvent) -> usize {
        let senders = self.senders.read().await;
        targets
            .iter()
            .filter_map(|id| senders.get(id).map(|sender| (*id, sender)))
            .filter(|(id, sender)| deliver(*id, sender, event.clone()))
            .count()
    }

    pub async fn broadcast_all(&self, event: &ServerEvent) -> usize {
        let senders = self.senders.read().await;
        senders
            .iter()
            .filter(|(id, sender)| deliver(**id, sender, event.clone()))
            .count()
    }
}

fn deliver(
    connection_id: ConnectionId,
    sender: &mpsc::Sender<ServerEvent>,
    event: ServerEvent,
) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            tracing::warn!(
                connection_id = %connection_id,
                event = event.name(),
                "outbound queue full, dropping event"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
