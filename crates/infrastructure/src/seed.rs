//! 启动时写入默认房间和演示用户，重复执行结果不变。

use application::{ApplicationError, PasswordHasher, RoomRepository, UserRepository};
use domain::Username;

pub const DEFAULT_ROOMS: [&str; 3] = ["#geral", "#projetos", "#jogos"];

/// 演示账号：用户名和明文密码
pub const DEFAULT_USERS: [(&str, &str); 2] = [("ana", "123"), ("joao", "456")];

pub fn avatar_url_for(username: &str) -> String {
    format!("https://i.pravatar.cc/150?u={username}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub rooms: usize,
    pub users: usize,
}

pub async fn seed_defaults(
    users: &dyn UserRepository,
    rooms: &dyn RoomRepository,
    hasher: &dyn PasswordHasher,
) -> Result<SeedReport, ApplicationError> {
    for name in DEFAULT_ROOMS {
        rooms.upsert(name).await?;
    }

    for (username, password) in DEFAULT_USERS {
        let username = Username::parse(username)?;
        let hash = hasher.hash(password).await?;
        let avatar = avatar_url_for(username.as_str());
        users.upsert(&username, &hash, Some(avatar)).await?;
    }

    let report = SeedReport {
        rooms: DEFAULT_ROOMS.len(),
        users: DEFAULT_USERS.len(),
    };
    tracing::info!(rooms = report.rooms, users = report.users, "database seeded");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::MemoryStore;

    use crate::password::BcryptPasswordHasher;

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let store = MemoryStore::new();
        let hasher = BcryptPasswordHasher::new(4);

        seed_defaults(&store, &store, &hasher).await.unwrap();
        seed_defaults(&store, &store, &hasher).await.unwrap();

        let names: Vec<String> = store
            .list_public()
            .await
            .unwrap()
            .into_iter()
            .map(|room| room.name)
            .collect();
        assert_eq!(names, DEFAULT_ROOMS);

        let ana = store
            .find_by_username(&Username::parse("ana").unwrap())
            .await
            .unwrap()
            .expect("ana seeded");
        assert_eq!(ana.avatar_url.as_deref(), Some("https://i.pravatar.cc/150?u=ana"));
        assert!(hasher.verify("123", &ana.password).await.unwrap());

        let joao = store
            .find_by_username(&Username::parse("joao").unwrap())
            .await
            .unwrap()
            .expect("joao seeded");
        assert!(hasher.verify("456", &joao.password).await.unwrap());
    }

    #[tokio::test]
    async fn seeding_keeps_existing_passwords() {
        let store = MemoryStore::new();
        let hasher = BcryptPasswordHasher::new(4);
        let ana = Username::parse("ana").unwrap();
        let changed = hasher.hash("nova-senha").await.unwrap();
        UserRepository::upsert(&store, &ana, &changed, None)
            .await
            .unwrap();

        seed_defaults(&store, &store, &hasher).await.unwrap();

        let seeded = store.find_by_username(&ana).await.unwrap().expect("ana seeded");
        assert!(hasher.verify("nova-senha", &seeded.password).await.unwrap());
        assert!(!hasher.verify("123", &seeded.password).await.unwrap());
        assert_eq!(seeded.avatar_url.as_deref(), Some("https://i.pravatar.cc/150?u=ana"));
    }
}
