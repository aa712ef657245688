//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、bcrypt 密码哈希和初始数据，实现应用层定义的接口。

pub mod builder;
pub mod migrations;
pub mod password;
pub mod repository;
pub mod seed;

pub use builder::{Infrastructure, InfrastructureError};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgMessageRepository, PgRoomRepository, PgStorage, PgUserRepository,
};
pub use seed::{seed_defaults, SeedReport, DEFAULT_ROOMS, DEFAULT_USERS};
