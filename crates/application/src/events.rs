//! WebSocket 事件协议
//!
//! 入站和出站都是 `{"event": "<name>", "data": <payload>}` 形式的 JSON 文本帧。

use domain::{Identity, UserId};
use serde::{Deserialize, Serialize};

use crate::dto::{DmConversationDto, DmStartedDto, MessageDto, OnlineUserDto};

/// 客户端发来的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    GetDmConversations,
    JoinRoom(String),
    StartDm(UserId),
    /// 文本在处理时才校验，非字符串或空白内容会被丢弃
    SendMessage(serde_json::Value),
    Typing,
    StopTyping,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::GetDmConversations => "get-dm-conversations",
            ClientEvent::JoinRoom(_) => "join-room",
            ClientEvent::StartDm(_) => "start-dm",
            ClientEvent::SendMessage(_) => "send-message",
            ClientEvent::Typing => "typing",
            ClientEvent::StopTyping => "stop-typing",
        }
    }
}

/// 服务器推送的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    OnlineUsers(Vec<OnlineUserDto>),
    AvailableRooms(Vec<String>),
    RoomJoined(String),
    MessageHistory(Vec<MessageDto>),
    DmConversationsList(Vec<DmConversationDto>),
    DmStarted(DmStartedDto),
    ReceiveMessage(MessageDto),
    UserTyping(Identity),
    UserStoppedTyping(Identity),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "online-users",
            ServerEvent::AvailableRooms(_) => "available-rooms",
            ServerEvent::RoomJoined(_) => "room-joined",
            ServerEvent::MessageHistory(_) => "message-history",
            ServerEvent::DmConversationsList(_) => "dm-conversations-list",
            ServerEvent::DmStarted(_) => "dm-started",
            ServerEvent::ReceiveMessage(_) => "receive-message",
            ServerEvent::UserTyping(_) => "user-typing",
            ServerEvent::UserStoppedTyping(_) => "user-stopped-typing",
        }
    }
}
