use crate::user::Identity;
use crate::value_objects::{MessageId, MessageText, RoomId, Timestamp, UserId};

/// 已持久化的聊天消息，创建后不可修改。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub text: MessageText,
    pub created_at: Timestamp,
}

/// 待写入存储的新消息；id 和创建时间由存储分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub author_id: UserId,
    pub text: MessageText,
}

impl NewMessage {
    pub fn new(room_id: RoomId, author_id: UserId, text: MessageText) -> Self {
        Self {
            room_id,
            author_id,
            text,
        }
    }
}

/// 附带作者信息的消息，用于历史记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoredMessage {
    pub message: Message,
    pub author: Identity,
}
