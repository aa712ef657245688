use domain::{ConnectionId, Identity, UserId};

/// 一条在线连接的会话。
///
/// 由 `ChatService::connect` 创建，`ChatService::disconnect` 消费。
/// 所在房间由 `RoomRouter` 记录，这样私聊可以把对方连接也拉进房间。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    identity: Identity,
    connection_id: ConnectionId,
}

impl Session {
    pub(crate) fn new(identity: Identity, connection_id: ConnectionId) -> Self {
        Self {
            identity,
            connection_id,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> UserId {
        self.identity.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}
