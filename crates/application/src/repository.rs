use async_trait::async_trait;
use domain::{
    AuthoredMessage, Message, NewMessage, PasswordHash, RepositoryError, Room, RoomId, User,
    UserId, Username,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    /// 批量查询，不存在的 id 直接忽略
    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;
    /// 按用户名插入用户；已存在时只更新头像，密码保持不变
    async fn upsert(
        &self,
        username: &Username,
        password: &PasswordHash,
        avatar_url: Option<String>,
    ) -> Result<User, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Room>, RepositoryError>;
    /// 名字已存在时返回 `RepositoryError::Conflict`
    async fn create(&self, name: &str) -> Result<Room, RepositoryError>;
    /// 存在则直接返回，不存在则创建
    async fn upsert(&self, name: &str) -> Result<Room, RepositoryError>;
    /// 所有非私聊房间，按 id 升序
    async fn list_public(&self) -> Result<Vec<Room>, RepositoryError>;
    /// 名字中包含该用户 id 的私聊房间
    async fn list_direct_for(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    // 保存消息，id 和创建时间由存储分配
    async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    // 房间内全部消息，按创建时间升序
    async fn list_for_room(&self, room_id: RoomId)
        -> Result<Vec<AuthoredMessage>, RepositoryError>;
}

/// 内存实现的存储（用于测试和无数据库运行）
pub mod memory {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use domain::{
        AuthoredMessage, Message, NewMessage, PasswordHash, RepositoryError, Room, RoomId, User,
        UserId, Username,
    };
    use tokio::sync::RwLock;

    use super::{MessageRepository, RoomRepository, UserRepository};
    use crate::clock::{Clock, SystemClock};

    #[derive(Default)]
    struct Tables {
        users: BTreeMap<UserId, User>,
        rooms: BTreeMap<RoomId, Room>,
        messages: Vec<Message>,
        next_user_id: i64,
        next_room_id: i64,
        next_message_id: i64,
    }

    impl Tables {
        fn next_id(counter: &mut i64) -> i64 {
            *counter += 1;
            *counter
        }
    }

    /// 三个仓储共享同一份表，`clone` 得到的是同一个存储的句柄。
    #[derive(Clone)]
    pub struct MemoryStore {
        tables: Arc<RwLock<Tables>>,
        clock: Arc<dyn Clock>,
    }

    impl Default for MemoryStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::with_clock(Arc::new(SystemClock))
        }

        pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
            Self {
                tables: Arc::new(RwLock::new(Tables::default())),
                clock,
            }
        }

        /// 当前保存的消息条数
        #[cfg(test)]
        pub(crate) async fn message_count(&self) -> usize {
            self.tables.read().await.messages.len()
        }
    }

    #[async_trait]
    impl UserRepository for MemoryStore {
        async fn find_by_username(
            &self,
            username: &Username,
        ) -> Result<Option<User>, RepositoryError> {
            let tables = self.tables.read().await;
            Ok(tables
                .users
                .values()
                .find(|user| &user.username == username)
                .cloned())
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
            Ok(self.tables.read().await.users.get(&id).cloned())
        }

        async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
            let tables = self.tables.read().await;
            Ok(ids
                .iter()
                .filter_map(|id| tables.users.get(id).cloned())
                .collect())
        }

        async fn upsert(
            &self,
            username: &Username,
            password: &PasswordHash,
            avatar_url: Option<String>,
        ) -> Result<User, RepositoryError> {
            let mut tables = self.tables.write().await;
            if let Some(user) = tables
                .users
                .values_mut()
                .find(|user| &user.username == username)
            {
                user.avatar_url = avatar_url;
                return Ok(user.clone());
            }

            let id = UserId(Tables::next_id(&mut tables.next_user_id));
            let user = User {
                id,
                username: username.clone(),
                password: password.clone(),
                avatar_url,
            };
            tables.users.insert(id, user.clone());
            Ok(user)
        }
    }

    #[async_trait]
    impl RoomRepository for MemoryStore {
        async fn find_by_name(&self, name: &str) -> Result<Option<Room>, RepositoryError> {
            let tables = self.tables.read().await;
            Ok(tables.rooms.values().find(|room| room.name == name).cloned())
        }

        async fn create(&self, name: &str) -> Result<Room, RepositoryError> {
            let mut tables = self.tables.write().await;
            if tables.rooms.values().any(|room| room.name == name) {
                return Err(RepositoryError::Conflict);
            }
            let id = RoomId(Tables::next_id(&mut tables.next_room_id));
            let room = Room::new(id, name);
            tables.rooms.insert(id, room.clone());
            Ok(room)
        }

        async fn upsert(&self, name: &str) -> Result<Room, RepositoryError> {
            match RoomRepository::create(self, name).await {
                Err(RepositoryError::Conflict) => self
                    .find_by_name(name)
                    .await?
                    .ok_or(RepositoryError::NotFound),
                other => other,
            }
        }

        async fn list_public(&self) -> Result<Vec<Room>, RepositoryError> {
            let tables = self.tables.read().await;
            Ok(tables
                .rooms
                .values()
                .filter(|room| room.is_public())
                .cloned()
                .collect())
        }

        async fn list_direct_for(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError> {
            let tables = self.tables.read().await;
            Ok(tables
                .rooms
                .values()
                .filter(|room| {
                    room.participants()
                        .is_some_and(|pair| pair.contains(user_id))
                })
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl MessageRepository for MemoryStore {
        async fn create(&self, message: NewMessage) -> Result<Message, RepositoryError> {
            let mut tables = self.tables.write().await;
            if !tables.rooms.contains_key(&message.room_id) {
                return Err(RepositoryError::NotFound);
            }
            let id = Tables::next_id(&mut tables.next_message_id);
            let stored = Message {
                id: id.into(),
                room_id: message.room_id,
                author_id: message.author_id,
                text: message.text,
                created_at: self.clock.now(),
            };
            tables.messages.push(stored.clone());
            Ok(stored)
        }

        async fn list_for_room(
            &self,
            room_id: RoomId,
        ) -> Result<Vec<AuthoredMessage>, RepositoryError> {
            let tables = self.tables.read().await;
            let mut history: Vec<AuthoredMessage> = tables
                .messages
                .iter()
                .filter(|message| message.room_id == room_id)
                .filter_map(|message| {
                    let author = tables.users.get(&message.author_id)?.identity();
                    Some(AuthoredMessage {
                        message: message.clone(),
                        author,
                    })
                })
                .collect();
            history.sort_by_key(|item| (item.message.created_at, item.message.id));
            Ok(history)
        }
    }

}
