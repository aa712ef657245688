use domain::{AuthoredMessage, ConnectionId, Identity, MessageId, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// 发送给客户端的消息，附带作者和房间名。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: MessageId,
    pub text: String,
    pub author_id: UserId,
    pub room_id: RoomId,
    pub created_at: Timestamp,
    pub user: Identity,
    pub room_name: String,
    /// 只有实时广播的消息才带发送者的连接句柄
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
}

impl MessageDto {
    pub fn from_authored(item: AuthoredMessage, room_name: &str) -> Self {
        let AuthoredMessage { message, author } = item;
        Self {
            id: message.id,
            text: message.text.as_str().to_owned(),
            author_id: message.author_id,
            room_id: message.room_id,
            created_at: message.created_at,
            user: author,
            room_name: room_name.to_owned(),
            connection_id: None,
        }
    }

    pub fn with_connection(mut self, connection_id: ConnectionId) -> Self {
        self.connection_id = Some(connection_id);
        self
    }
}

/// 在线列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUserDto {
    #[serde(flatten)]
    pub user: Identity,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmConversationDto {
    pub room_name: String,
    pub other_user: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmStartedDto {
    pub room_name: String,
    pub users: Vec<Identity>,
}
