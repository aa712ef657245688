//! 应用层实现。
//!
//! 这里是聊天核心：连接会话、在线表、房间路由和事件分发，
//! 以及对存储、密码哈希、令牌签发等外部适配器的抽象。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod events;
pub mod password;
pub mod presence;
pub mod repository;
pub mod router;
pub mod services;
pub mod session;
pub mod token;

pub use broadcaster::{ConnectionHub, EventReceiver};
pub use clock::{Clock, SystemClock};
pub use dto::{DmConversationDto, DmStartedDto, MessageDto, OnlineUserDto};
pub use error::{ApplicationError, AuthError, LoginError};
pub use events::{ClientEvent, ServerEvent};
pub use password::{PasswordHasher, PasswordHasherError};
pub use presence::{PresenceEntry, PresenceRegistry};
pub use repository::memory::MemoryStore;
pub use repository::{MessageRepository, RoomRepository, UserRepository};
pub use router::{JoinOutcome, RoomRouter};
pub use services::{
    AuthService, AuthServiceDependencies, ChatService, ChatServiceDependencies, LoginRequest,
};
pub use session::Session;
pub use token::{TokenError, TokenService};
