//! 聊天系统核心领域模型
//!
//! 用户身份、房间（公共房间与私聊房间）、消息，以及私聊房间的命名规则。

pub mod chat_room;
pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

pub use chat_room::{
    direct_room_name, is_direct_room_name, DirectPair, Room, RoomKind, DIRECT_ROOM_PREFIX,
};
pub use errors::{DomainError, DomainResult, RepositoryError, RepositoryResult};
pub use message::{AuthoredMessage, Message, NewMessage};
pub use user::{Identity, User};
pub use value_objects::{
    ConnectionId, MessageId, MessageText, PasswordHash, RoomId, Timestamp, UserId, Username,
};
