use std::collections::BTreeMap;

use domain::{ConnectionId, Identity, UserId};
use tokio::sync::Mutex;

use crate::broadcaster::ConnectionHub;
use crate::dto::OnlineUserDto;
use crate::events::ServerEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub identity: Identity,
    pub connection_id: ConnectionId,
}

/// 进程内的在线用户表，每个用户最多一条记录。
///
/// 修改和随后的 `online-users` 广播在同一把锁内完成，
/// 广播出去的永远是某次修改之后的完整快照。
pub struct PresenceRegistry {
    entries: Mutex<BTreeMap<UserId, PresenceEntry>>,
    hub: ConnectionHub,
}

impl PresenceRegistry {
    pub fn new(hub: ConnectionHub) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            hub,
        }
    }

    /// 插入或覆盖。同一用户的新连接会顶替旧连接的句柄。
    pub async fn upsert(&self, identity: Identity, connection_id: ConnectionId) {
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.get(&identity.id) {
            if previous.connection_id != connection_id {
                tracing::debug!(
                    user_id = %identity.id,
                    previous = %previous.connection_id,
                    current = %connection_id,
                    "presence handle replaced by newer connection"
                );
            }
        }
        entries.insert(
            identity.id,
            PresenceEntry {
                identity,
                connection_id,
            },
        );
        self.publish(&entries).await;
    }

    /// 只有记录仍指向这个连接时才删除，旧连接断开不会把新连接挤下线。
    /// 无论是否删除都会广播一次。
    pub async fn remove(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut entries = self.entries.lock().await;
        let removed = match entries.get(&user_id) {
            Some(entry) if entry.connection_id == connection_id => {
                entries.remove(&user_id);
                true
            }
            _ => false,
        };
        self.publish(&entries).await;
        removed
    }

    pub async fn lookup(&self, user_id: UserId) -> Option<PresenceEntry> {
        self.entries.lock().await.get(&user_id).cloned()
    }

    async fn publish(&self, entries: &BTreeMap<UserId, PresenceEntry>) {
        let event = ServerEvent::OnlineUsers(to_online_users(entries));
        self.hub.broadcast_all(&event).await;
    }
}

fn to_online_users(entries: &BTreeMap<UserId, PresenceEntry>) -> Vec<OnlineUserDto> {
    entries
        .values()
        .map(|entry| OnlineUserDto {
            user: entry.identity.clone(),
            connection_id: entry.connection_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Username;

    fn identity(id: i64, name: &str) -> Identity {
        Identity {
            id: UserId(id),
            username: Username::parse(name).unwrap(),
            avatar_url: None,
        }
    }

    fn online(event: Option<ServerEvent>) -> Vec<OnlineUserDto> {
        match event {
            Some(ServerEvent::OnlineUsers(users)) => users,
            other => panic!("expected online-users, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upsert_broadcasts_full_snapshot_to_everyone() {
        let hub = ConnectionHub::new(16);
        let registry = PresenceRegistry::new(hub.clone());
        let c1 = ConnectionId::generate();
        let c2 = ConnectionId::generate();
        let mut rx1 = hub.register(c1).await;
        let mut rx2 = hub.register(c2).await;

        registry.upsert(identity(1, "ana"), c1).await;
        registry.upsert(identity(2, "joao"), c2).await;

        assert_eq!(online(rx1.recv().await).len(), 1);
        let latest = online(rx1.recv().await);
        assert_eq!(latest.len(), 2);
        assert_eq!(online(rx2.recv().await).len(), 1);
        assert_eq!(online(rx2.recv().await), latest);
    }

    #[tokio::test]
    async fn second_connection_replaces_handle() {
        let hub = ConnectionHub::new(16);
        let registry = PresenceRegistry::new(hub.clone());
        let first = ConnectionId::generate();
        let second = ConnectionId::generate();
        let mut rx = hub.register(first).await;

        registry.upsert(identity(1, "ana"), first).await;
        registry.upsert(identity(1, "ana"), second).await;

        online(rx.recv().await);
        let latest = online(rx.recv().await);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].connection_id, second);
        assert_eq!(
            registry.lookup(UserId(1)).await.map(|e| e.connection_id),
            Some(second)
        );
    }

    #[tokio::test]
    async fn stale_connection_does_not_remove_newer_entry() {
        let hub = ConnectionHub::new(16);
        let registry = PresenceRegistry::new(hub);
        let first = ConnectionId::generate();
        let second = ConnectionId::generate();

        registry.upsert(identity(1, "ana"), first).await;
        registry.upsert(identity(1, "ana"), second).await;

        assert!(!registry.remove(UserId(1), first).await);
        assert!(registry.lookup(UserId(1)).await.is_some());
        assert!(registry.remove(UserId(1), second).await);
        assert!(registry.lookup(UserId(1)).await.is_none());
        assert!(!registry.remove(UserId(1), second).await);
    }

    #[tokio::test]
    async fn concurrent_connects_yield_one_entry_per_identity() {
        let hub = ConnectionHub::new(64);
        let registry = std::sync::Arc::new(PresenceRegistry::new(hub.clone()));
        let observer = ConnectionId::generate();
        let mut rx = hub.register(observer).await;

        // 每个用户先后用两个连接上线，最终应只保留后一个
        let handles: Vec<_> = (1..=20)
            .map(|id| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let user = identity(id, &format!("user{id}"));
                    registry.upsert(user.clone(), ConnectionId::generate()).await;
                    let latest = ConnectionId::generate();
                    registry.upsert(user, latest).await;
                    (UserId(id), latest)
                })
            })
            .collect();
        let mut expected = BTreeMap::new();
        for handle in handles {
            let (user_id, connection_id) = handle.await.unwrap();
            expected.insert(user_id, connection_id);
        }

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        let online_users = online(last);
        assert_eq!(online_users.len(), 20);
        let published: BTreeMap<UserId, ConnectionId> = online_users
            .iter()
            .map(|entry| (entry.user.id, entry.connection_id))
            .collect();
        assert_eq!(published, expected);
    }
}
