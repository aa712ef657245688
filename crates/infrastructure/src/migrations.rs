use sqlx::migrate::Migrator;

/// 建表脚本，位于仓库根目录的 `migrations/`
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
