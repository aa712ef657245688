use std::sync::Arc;

use application::{
    AuthService, AuthServiceDependencies, ChatService, ChatServiceDependencies, ConnectionHub,
};
use config::AppConfig;
use infrastructure::Infrastructure;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub chat_service: Arc<ChatService>,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        auth_service: Arc<AuthService>,
        chat_service: Arc<ChatService>,
        cors_origins: Vec<String>,
    ) -> Self {
        Self {
            auth_service,
            chat_service,
            cors_origins,
        }
    }

    /// 按配置把存储、令牌服务和聊天核心组装起来
    pub fn from_config(config: &AppConfig, infrastructure: Infrastructure) -> Self {
        let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

        let auth_service = AuthService::new(AuthServiceDependencies {
            user_repository: infrastructure.user_repository.clone(),
            password_hasher: infrastructure.password_hasher.clone(),
            token_service: jwt_service,
        });

        let chat_service = ChatService::new(ChatServiceDependencies {
            user_repository: infrastructure.user_repository,
            room_repository: infrastructure.room_repository,
            message_repository: infrastructure.message_repository,
            hub: ConnectionHub::new(config.chat.outbound_buffer),
            default_room: config.chat.default_room.clone(),
        });

        Self::new(
            Arc::new(auth_service),
            Arc::new(chat_service),
            config.server.cors_origins.clone(),
        )
    }
}
