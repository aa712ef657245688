use std::collections::{HashMap, HashSet};

use domain::{ConnectionId, Room};
use tokio::sync::Mutex;

use crate::broadcaster::ConnectionHub;
use crate::events::ServerEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// 已经在目标房间，什么都没做
    AlreadyJoined,
    Joined { left: Option<Room> },
    /// 连接已断开
    Detached,
}

#[derive(Default)]
struct RouterState {
    /// 房间名 -> 订阅该房间的连接
    rooms: HashMap<String, HashSet<ConnectionId>>,
    /// 连接 -> 当前所在房间
    sessions: HashMap<ConnectionId, Option<Room>>,
}

impl RouterState {
    fn unsubscribe(&mut self, connection_id: ConnectionId, room_name: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room_name) else {
            return false;
        };
        let removed = members.remove(&connection_id);
        if members.is_empty() {
            self.rooms.remove(room_name);
        }
        removed
    }

    fn switch(&mut self, connection_id: ConnectionId, room: &Room) -> JoinOutcome {
        let current = match self.sessions.get(&connection_id) {
            None => return JoinOutcome::Detached,
            Some(current) => current.clone(),
        };
        if current.as_ref().is_some_and(|r| r.name == room.name) {
            return JoinOutcome::AlreadyJoined;
        }

        if let Some(previous) = &current {
            self.unsubscribe(connection_id, &previous.name);
        }
        self.rooms
            .entry(room.name.clone())
            .or_default()
            .insert(connection_id);
        self.sessions.insert(connection_id, Some(room.clone()));
        JoinOutcome::Joined { left: current }
    }
}

/// 房间成员关系的唯一来源。
///
/// 所有房间切换都经过 `join`，先离开再加入，一个连接任何时刻最多订阅一个房间。
pub struct RoomRouter {
    state: Mutex<RouterState>,
    hub: ConnectionHub,
}

impl RoomRouter {
    pub fn new(hub: ConnectionHub) -> Self {
        Self {
            state: Mutex::new(RouterState::default()),
            hub,
        }
    }

    /// 连接建立时登记，此时不在任何房间
    pub async fn attach(&self, connection_id: ConnectionId) {
        self.state
            .lock()
            .await
            .sessions
            .entry(connection_id)
            .or_insert(None);
    }

    /// 连接断开时移除，返回它最后所在的房间
    pub async fn detach(&self, connection_id: ConnectionId) -> Option<Room> {
        let mut state = self.state.lock().await;
        let room = state.sessions.remove(&connection_id).flatten()?;
        state.unsubscribe(connection_id, &room.name);
        Some(room)
    }

    pub async fn join(&self, connection_id: ConnectionId, room: &Room) -> JoinOutcome {
        self.state.lock().await.switch(connection_id, room)
    }

    /// 只有连接还不在任何房间时才加入，检查和加入在同一次加锁内完成。
    /// 返回 `true` 表示本次调用完成了加入。
    pub async fn join_if_unassigned(&self, connection_id: ConnectionId, room: &Room) -> bool {
        let mut state = self.state.lock().await;
        if !matches!(state.sessions.get(&connection_id), Some(None)) {
            return false;
        }
        matches!(state.switch(connection_id, room), JoinOutcome::Joined { .. })
    }

    pub async fn leave(&self, connection_id: ConnectionId, room_name: &str) -> bool {
        let mut state = self.state.lock().await;
        let occupies = matches!(
            state.sessions.get(&connection_id),
            Some(Some(room)) if room.name == room_name
        );
        if !occupies {
            return false;
        }
        state.sessions.insert(connection_id, None);
        state.unsubscribe(connection_id, room_name)
    }

    pub async fn current_room(&self, connection_id: ConnectionId) -> Option<Room> {
        self.state
            .lock()
            .await
            .sessions
            .get(&connection_id)
            .cloned()
            .flatten()
    }

    pub async fn members(&self, room_name: &str) -> Vec<ConnectionId> {
        self.state
            .lock()
            .await
            .rooms
            .get(room_name)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 投递给调用时刻的订阅者快照，`except` 用于排除发送者自己
    pub async fn broadcast_to_room(
        &self,
        room_name: &str,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let targets: Vec<ConnectionId> = self
            .members(room_name)
            .await
            .into_iter()
            .filter(|id| Some(*id) != except)
            .collect();
        self.hub.send_to_many(&targets, &event).await
    }
}
