mod auth_service;
mod chat_service;

pub use auth_service::{AuthService, AuthServiceDependencies, LoginRequest};
pub use chat_service::{ChatService, ChatServiceDependencies};
