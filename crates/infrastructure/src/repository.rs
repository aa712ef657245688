use std::sync::Arc;

use application::repository::{MessageRepository, RoomRepository, UserRepository};
use async_trait::async_trait;
use domain::{
    AuthoredMessage, Identity, Message, MessageId, MessageText, NewMessage, PasswordHash,
    RepositoryError, Room, RoomId, Timestamp, User, UserId, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return RepositoryError::Conflict,
            Some(FOREIGN_KEY_VIOLATION) => return RepositoryError::NotFound,
            _ => {}
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    password: String,
    avatar_url: Option<String>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username = Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(value.password).map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::from(value.id),
            username,
            password,
            avatar_url: value.avatar_url,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: i64,
    name: String,
}

impl From<RoomRecord> for Room {
    fn from(value: RoomRecord) -> Self {
        Room::new(RoomId::from(value.id), value.name)
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    text: String,
    author_id: i64,
    room_id: i64,
    created_at: Timestamp,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let text = MessageText::parse(value.text).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::from(value.id),
            room_id: RoomId::from(value.room_id),
            author_id: UserId::from(value.author_id),
            text,
            created_at: value.created_at,
        })
    }
}

/// 历史消息连同作者一起查出
#[derive(Debug, FromRow)]
struct AuthoredMessageRecord {
    #[sqlx(flatten)]
    message: MessageRecord,
    username: String,
    avatar_url: Option<String>,
}

impl TryFrom<AuthoredMessageRecord> for AuthoredMessage {
    type Error = RepositoryError;

    fn try_from(value: AuthoredMessageRecord) -> Result<Self, Self::Error> {
        let message = Message::try_from(value.message)?;
        let username = Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        Ok(AuthoredMessage {
            author: Identity {
                id: message.author_id,
                username,
                avatar_url: value.avatar_url,
            },
            message,
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, password, avatar_url
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, password, avatar_url
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        let records = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, password, avatar_url
            FROM users
            WHERE id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(User::try_from).collect()
    }

    async fn upsert(
        &self,
        username: &Username,
        password: &PasswordHash,
        avatar_url: Option<String>,
    ) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, password, avatar_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (username) DO UPDATE
            SET avatar_url = EXCLUDED.avatar_url
            RETURNING id, username, password, avatar_url
            "#,
        )
        .bind(username.as_str())
        .bind(password.as_str())
        .bind(avatar_url)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }
}

#[derive(Clone)]
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Room>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>("SELECT id, name FROM rooms WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(record.map(Room::from))
    }

    async fn create(&self, name: &str) -> Result<Room, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            "INSERT INTO rooms (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn upsert(&self, name: &str) -> Result<Room, RepositoryError> {
        // DO UPDATE 保证冲突时也能 RETURNING 已有的行
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO rooms (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn list_public(&self) -> Result<Vec<Room>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, name
            FROM rooms
            WHERE name NOT LIKE 'dm-%'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records
            .into_iter()
            .map(Room::from)
            .filter(Room::is_public)
            .collect())
    }

    async fn list_direct_for(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, name
            FROM rooms
            WHERE name LIKE 'dm-%'
              AND (split_part(name, '-', 2) = $1 OR split_part(name, '-', 3) = $1)
            ORDER BY id
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        // SQL 只做粗筛，最终以规范房间名为准
        Ok(records
            .into_iter()
            .map(Room::from)
            .filter(|room| room.participants().is_some_and(|pair| pair.contains(user_id)))
            .collect())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (text, author_id, room_id)
            VALUES ($1, $2, $3)
            RETURNING id, text, author_id, room_id, created_at
            "#,
        )
        .bind(message.text.as_str())
        .bind(message.author_id.value())
        .bind(message.room_id.value())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn list_for_room(&self, room_id: RoomId) -> Result<Vec<AuthoredMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, AuthoredMessageRecord>(
            r#"
            SELECT m.id, m.text, m.author_id, m.room_id, m.created_at,
                   u.username, u.avatar_url
            FROM messages m
            JOIN users u ON u.id = m.author_id
            WHERE m.room_id = $1
            ORDER BY m.created_at ASC, m.id ASC
            "#,
        )
        .bind(room_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(AuthoredMessage::try_from).collect()
    }
}

/// 同一个连接池上的三个仓储
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub room_repository: Arc<PgRoomRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            room_repository: Arc::new(PgRoomRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
