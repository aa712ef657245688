use std::sync::Arc;

use application::{MemoryStore, MessageRepository, PasswordHasher, RoomRepository, UserRepository};
use config::AppConfig;
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
    seed::seed_defaults,
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("seeding failed: {0}")]
    Seed(#[from] application::ApplicationError),
}

/// 存储与密码哈希的具体实现，按配置选择 PostgreSQL 或内存存储
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub room_repository: Arc<dyn RoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let password_hasher = Arc::new(BcryptPasswordHasher::new(config.security.bcrypt_cost));

        let infrastructure = if config.database.is_memory() {
            tracing::warn!("using in-memory storage, data is lost on restart");
            Self::in_memory(password_hasher)
        } else {
            tracing::info!(database = %config.redacted_database_url(), "connecting to database");
            let pool =
                create_pg_pool(&config.database.url, config.database.max_connections).await?;
            MIGRATOR.run(&pool).await?;

            let storage = PgStorage::new(pool);
            Self {
                user_repository: storage.user_repository,
                room_repository: storage.room_repository,
                message_repository: storage.message_repository,
                password_hasher,
            }
        };

        if config.chat.seed {
            infrastructure.seed().await?;
        }
        Ok(infrastructure)
    }

    fn in_memory(password_hasher: Arc<BcryptPasswordHasher>) -> Self {
        let store = MemoryStore::new();
        Self {
            user_repository: Arc::new(store.clone()),
            room_repository: Arc::new(store.clone()),
            message_repository: Arc::new(store),
            password_hasher,
        }
    }

    pub async fn seed(&self) -> Result<(), InfrastructureError> {
        seed_defaults(
            self.user_repository.as_ref(),
            self.room_repository.as_ref(),
            self.password_hasher.as_ref(),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Username;

    #[tokio::test]
    async fn memory_backend_is_seeded_from_config() {
        let mut config = AppConfig::default();
        config.database.url = config::MEMORY_DATABASE_URL.to_string();
        config.security.bcrypt_cost = 4;

        let infrastructure = Infrastructure::connect(&config).await.unwrap();

        let rooms = infrastructure.room_repository.list_public().await.unwrap();
        assert_eq!(rooms.len(), 3);
        let ana = infrastructure
            .user_repository
            .find_by_username(&Username::parse("ana").unwrap())
            .await
            .unwrap();
        assert!(ana.is_some());
    }

    #[tokio::test]
    async fn seeding_can_be_disabled() {
        let mut config = AppConfig::default();
        config.database.url = config::MEMORY_DATABASE_URL.to_string();
        config.chat.seed = false;

        let infrastructure = Infrastructure::connect(&config).await.unwrap();
        assert!(infrastructure
            .room_repository
            .list_public()
            .await
            .unwrap()
            .is_empty());
    }
}
