//! Web API 层。
//!
//! 提供 Axum 路由：HTTP 登录、健康检查，以及承载聊天事件的 WebSocket 连接。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{bearer_token, Claims, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::{router, LoginResponse};
pub use state::AppState;
