use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    direct_room_name, AuthoredMessage, ConnectionId, DirectPair, Identity, MessageText,
    NewMessage, RepositoryError, Room, UserId,
};
use serde_json::Value;

use crate::{
    broadcaster::{ConnectionHub, EventReceiver},
    dto::{DmConversationDto, DmStartedDto, MessageDto},
    error::ApplicationError,
    events::{ClientEvent, ServerEvent},
    presence::PresenceRegistry,
    repository::{MessageRepository, RoomRepository, UserRepository},
    router::{JoinOutcome, RoomRouter},
    session::Session,
};

pub struct ChatServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub room_repository: Arc<dyn RoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub hub: ConnectionHub,
    /// 连接建立后自动加入的房间
    pub default_room: String,
}

/// 每个连接的事件处理入口。
///
/// 共享状态只有 `PresenceRegistry` 和 `RoomRouter`，两者各自加锁；
/// 存储调用期间不持有任何锁。
pub struct ChatService {
    deps: ChatServiceDependencies,
    presence: PresenceRegistry,
    router: RoomRouter,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        let presence = PresenceRegistry::new(deps.hub.clone());
        let router = RoomRouter::new(deps.hub.clone());
        Self {
            deps,
            presence,
            router,
        }
    }

    #[cfg(test)]
    pub(crate) fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    #[cfg(test)]
    pub(crate) fn router(&self) -> &RoomRouter {
        &self.router
    }

    /// 认证通过后的连接建立流程。
    ///
    /// 存储读取失败只记录日志，连接照常建立。
    pub async fn connect(&self, identity: Identity) -> (Session, EventReceiver) {
        let connection_id = ConnectionId::generate();
        let receiver = self.deps.hub.register(connection_id).await;
        self.router.attach(connection_id).await;
        self.presence.upsert(identity.clone(), connection_id).await;

        tracing::info!(
            user_id = %identity.id,
            username = %identity.username,
            connection_id = %connection_id,
            "user connected"
        );
        let session = Session::new(identity, connection_id);

        let rooms = match self.deps.room_repository.list_public().await {
            Ok(rooms) => rooms,
            Err(err) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "failed to load public rooms");
                return (session, receiver);
            }
        };
        let names: Vec<String> = rooms.iter().map(|room| room.name.clone()).collect();
        self.deps
            .hub
            .send_to(connection_id, ServerEvent::AvailableRooms(names))
            .await;

        if let Some(room) = rooms
            .into_iter()
            .find(|room| room.name == self.deps.default_room)
        {
            // 等待存储期间可能已被私聊邀请拉入其他房间，此时保留那个房间
            if !self.router.join_if_unassigned(connection_id, &room).await {
                tracing::debug!(connection_id = %connection_id, "already placed in a room, default room skipped");
                return (session, receiver);
            }
            match self.room_history(&room).await {
                Ok(history) => {
                    self.deps
                        .hub
                        .send_to(connection_id, ServerEvent::MessageHistory(history))
                        .await;
                }
                Err(err) => {
                    tracing::warn!(room = %room.name, error = %err, "failed to load message history");
                }
            }
            tracing::debug!(connection_id = %connection_id, room = %room.name, "joined default room");
        }

        (session, receiver)
    }

    /// 处理一个入站事件。失败只记日志，不会影响连接本身。
    pub async fn handle(&self, session: &Session, event: ClientEvent) {
        let name = event.name();
        let result = match event {
            ClientEvent::GetDmConversations => {
                self.list_dm_conversations(session).await;
                Ok(())
            }
            ClientEvent::JoinRoom(room_name) => self.join_room(session, &room_name).await,
            ClientEvent::StartDm(target) => self.start_dm(session, target).await,
            ClientEvent::SendMessage(payload) => self.send_message(session, payload).await,
            ClientEvent::Typing => {
                self.typing(session).await;
                Ok(())
            }
            ClientEvent::StopTyping => {
                self.stop_typing(session).await;
                Ok(())
            }
        };

        if let Err(err) = result {
            tracing::warn!(
                connection_id = %session.connection_id(),
                event = name,
                error = %err,
                "event handling failed"
            );
        }
    }

    /// 读取失败时回复空列表，请求方总能收到 `dm-conversations-list`
    pub async fn list_dm_conversations(&self, session: &Session) {
        let conversations = match self.dm_conversations_of(session.user_id()).await {
            Ok(conversations) => conversations,
            Err(err) => {
                tracing::warn!(
                    connection_id = %session.connection_id(),
                    error = %err,
                    "failed to load direct conversations"
                );
                Vec::new()
            }
        };
        self.deps
            .hub
            .send_to(
                session.connection_id(),
                ServerEvent::DmConversationsList(conversations),
            )
            .await;
    }

    async fn dm_conversations_of(
        &self,
        me: UserId,
    ) -> Result<Vec<DmConversationDto>, ApplicationError> {
        let rooms = self.deps.room_repository.list_direct_for(me).await?;

        let pairs: Vec<(String, UserId)> = rooms
            .into_iter()
            .filter_map(|room| {
                let other = DirectPair::parse(&room.name).ok()?.other(me)?;
                Some((room.name, other))
            })
            .collect();
        let ids: Vec<UserId> = pairs.iter().map(|(_, other)| *other).collect();
        let users: HashMap<UserId, Identity> = self
            .deps
            .user_repository
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|user| (user.id, user.identity()))
            .collect();

        Ok(pairs
            .into_iter()
            .filter_map(|(room_name, other)| {
                let other_user = users.get(&other)?.clone();
                Some(DmConversationDto {
                    room_name,
                    other_user,
                })
            })
            .collect())
    }

    /// 切换到已存在的房间。私聊房间只允许参与者加入。
    pub async fn join_room(&self, session: &Session, room_name: &str) -> Result<(), ApplicationError> {
        let Some(room) = self.deps.room_repository.find_by_name(room_name).await? else {
            tracing::debug!(room = %room_name, "join-room for unknown room ignored");
            return Ok(());
        };
        if !room.admits(session.user_id()) {
            tracing::warn!(
                user_id = %session.user_id(),
                room = %room.name,
                "join-room for foreign direct room ignored"
            );
            return Ok(());
        }

        let connection_id = session.connection_id();
        match self.router.join(connection_id, &room).await {
            JoinOutcome::Joined { left } => {
                tracing::info!(
                    connection_id = %connection_id,
                    room = %room.name,
                    left = left.as_ref().map(|r| r.name.as_str()).unwrap_or("-"),
                    "joined room"
                );
                self.deps
                    .hub
                    .send_to(connection_id, ServerEvent::RoomJoined(room.name.clone()))
                    .await;
                let history = self.room_history(&room).await?;
                self.deps
                    .hub
                    .send_to(connection_id, ServerEvent::MessageHistory(history))
                    .await;
            }
            JoinOutcome::AlreadyJoined | JoinOutcome::Detached => {}
        }
        Ok(())
    }

    /// 与在线用户建立私聊，双方都会被切换到私聊房间。
    pub async fn start_dm(&self, session: &Session, target: UserId) -> Result<(), ApplicationError> {
        let me = session.user_id();
        if target == me {
            tracing::debug!(user_id = %me, "start-dm with self ignored");
            return Ok(());
        }
        let Some(peer) = self.presence.lookup(target).await else {
            tracing::debug!(user_id = %me, target = %target, "start-dm target offline");
            return Ok(());
        };

        let room = self.find_or_create_room(&direct_room_name(me, target)).await?;

        self.router.join(session.connection_id(), &room).await;
        if self.router.join(peer.connection_id, &room).await == JoinOutcome::Detached {
            tracing::debug!(target = %target, room = %room.name, "peer disconnected before joining");
        }
        tracing::info!(user_id = %me, target = %target, room = %room.name, "direct conversation started");

        let started = ServerEvent::DmStarted(DmStartedDto {
            room_name: room.name.clone(),
            users: vec![session.identity().clone(), peer.identity],
        });
        self.router.broadcast_to_room(&room.name, started, None).await;

        let history = self.room_history(&room).await?;
        self.router
            .broadcast_to_room(&room.name, ServerEvent::MessageHistory(history), None)
            .await;
        Ok(())
    }

    /// 保存并广播消息，非字符串或空白文本、未在任何房间时直接丢弃。
    pub async fn send_message(&self, session: &Session, payload: Value) -> Result<(), ApplicationError> {
        let Value::String(raw) = payload else {
            tracing::debug!(connection_id = %session.connection_id(), "non-text message dropped");
            return Ok(());
        };
        let Ok(text) = MessageText::parse(raw) else {
            tracing::debug!(connection_id = %session.connection_id(), "blank message dropped");
            return Ok(());
        };
        let Some(room) = self.router.current_room(session.connection_id()).await else {
            tracing::debug!(connection_id = %session.connection_id(), "message outside any room dropped");
            return Ok(());
        };

        let message = self
            .deps
            .message_repository
            .create(NewMessage::new(room.id, session.user_id(), text))
            .await?;
        tracing::info!(
            message_id = %message.id,
            user_id = %session.user_id(),
            room = %room.name,
            "message persisted"
        );

        let dto = MessageDto::from_authored(
            AuthoredMessage {
                message,
                author: session.identity().clone(),
            },
            &room.name,
        )
        .with_connection(session.connection_id());
        self.router
            .broadcast_to_room(&room.name, ServerEvent::ReceiveMessage(dto), None)
            .await;
        Ok(())
    }

    pub async fn typing(&self, session: &Session) {
        self.signal_room(session, ServerEvent::UserTyping(session.identity().clone()))
            .await;
    }

    pub async fn stop_typing(&self, session: &Session) {
        self.signal_room(
            session,
            ServerEvent::UserStoppedTyping(session.identity().clone()),
        )
        .await;
    }

    /// 连接断开：离开房间并通知停止输入，然后更新在线列表。
    pub async fn disconnect(&self, session: Session) {
        let connection_id = session.connection_id();
        let room = self.router.detach(connection_id).await;
        self.deps.hub.unregister(connection_id).await;

        if let Some(room) = &room {
            self.router
                .broadcast_to_room(
                    &room.name,
                    ServerEvent::UserStoppedTyping(session.identity().clone()),
                    None,
                )
                .await;
        }
        self.presence.remove(session.user_id(), connection_id).await;

        tracing::info!(
            user_id = %session.user_id(),
            connection_id = %connection_id,
            room = room.as_ref().map(|r| r.name.as_str()).unwrap_or("-"),
            "user disconnected"
        );
    }

    async fn signal_room(&self, session: &Session, event: ServerEvent) {
        let connection_id = session.connection_id();
        if let Some(room) = self.router.current_room(connection_id).await {
            self.router
                .broadcast_to_room(&room.name, event, Some(connection_id))
                .await;
        }
    }

    async fn room_history(&self, room: &Room) -> Result<Vec<MessageDto>, ApplicationError> {
        let history = self.deps.message_repository.list_for_room(room.id).await?;
        Ok(history
            .into_iter()
            .map(|item| MessageDto::from_authored(item, &room.name))
            .collect())
    }

    async fn find_or_create_room(&self, name: &str) -> Result<Room, ApplicationError> {
        if let Some(room) = self.deps.room_repository.find_by_name(name).await? {
            return Ok(room);
        }
        match self.deps.room_repository.create(name).await {
            Ok(room) => Ok(room),
            // 另一个连接刚刚创建了同名房间
            Err(RepositoryError::Conflict) => self
                .deps
                .room_repository
                .find_by_name(name)
                .await?
                .ok_or_else(|| RepositoryError::NotFound.into()),
            Err(err) => Err(err.into()),
        }
    }
}
