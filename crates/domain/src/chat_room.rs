use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{RoomId, UserId};

/// 私聊房间名前缀。公共房间的名字不能以它开头。
pub const DIRECT_ROOM_PREFIX: &str = "dm-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Public,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
}

impl Room {
    pub fn new(id: RoomId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> RoomKind {
        if is_direct_room_name(&self.name) {
            RoomKind::Direct
        } else {
            RoomKind::Public
        }
    }

    pub fn is_public(&self) -> bool {
        self.kind() == RoomKind::Public
    }

    /// 私聊房间的两个参与者，按 id 升序。
    pub fn participants(&self) -> Option<DirectPair> {
        DirectPair::parse(&self.name).ok()
    }

    /// 判断用户能否进入该房间：公共房间对所有人开放，私聊房间只对两个参与者开放。
    pub fn admits(&self, user_id: UserId) -> bool {
        match self.participants() {
            Some(pair) => pair.contains(user_id),
            None => self.is_public(),
        }
    }
}

pub fn is_direct_room_name(name: &str) -> bool {
    name.starts_with(DIRECT_ROOM_PREFIX)
}

/// 私聊双方的无序 id 对。
///
/// 内部总是保存 `low <= high`，因此 `DirectPair::new(a, b) == DirectPair::new(b, a)`，
/// 房间名 `dm-{low}-{high}` 由此唯一确定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectPair {
    low: UserId,
    high: UserId,
}

impl DirectPair {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn parse(name: &str) -> Result<Self, DomainError> {
        let not_direct = || DomainError::NotDirectRoom(name.to_owned());
        let rest = name.strip_prefix(DIRECT_ROOM_PREFIX).ok_or_else(not_direct)?;
        let (first, second) = rest.split_once('-').ok_or_else(not_direct)?;
        let parse_id = |segment: &str| {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(not_direct());
            }
            segment.parse::<UserId>().map_err(|_| not_direct())
        };
        let pair = Self::new(parse_id(first)?, parse_id(second)?);
        // 只接受规范形式，"dm-9-3" 这种名字不是任何一对用户的房间
        if pair.room_name() != name {
            return Err(not_direct());
        }
        Ok(pair)
    }

    pub fn room_name(&self) -> String {
        format!("{}{}-{}", DIRECT_ROOM_PREFIX, self.low, self.high)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// 给定一方，返回另一方；不属于这对用户时返回 `None`。
    pub fn other(&self, me: UserId) -> Option<UserId> {
        if self.low == me {
            Some(self.high)
        } else if self.high == me {
            Some(self.low)
        } else {
            None
        }
    }
}

/// 由两个参与者计算私聊房间名，与调用顺序无关。
pub fn direct_room_name(a: UserId, b: UserId) -> String {
    DirectPair::new(a, b).room_name()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_room_name_is_commutative() {
        for (a, b) in [(1, 2), (9, 10), (10, 9), (3, 3), (100, 7)] {
            assert_eq!(
                direct_room_name(UserId(a), UserId(b)),
                direct_room_name(UserId(b), UserId(a))
            );
        }
    }

    #[test]
    fn direct_room_name_orders_numerically() {
        assert_eq!(direct_room_name(UserId(10), UserId(9)), "dm-9-10");
        assert_eq!(direct_room_name(UserId(2), UserId(1)), "dm-1-2");
    }

    #[test]
    fn parse_round_trips_canonical_names() {
        let pair = DirectPair::parse("dm-4-12").unwrap();
        assert_eq!(pair.room_name(), "dm-4-12");
        assert_eq!(pair.other(UserId(4)), Some(UserId(12)));
        assert_eq!(pair.other(UserId(12)), Some(UserId(4)));
        assert_eq!(pair.other(UserId(5)), None);
    }

    #[test]
    fn parse_rejects_non_canonical_names() {
        assert!(DirectPair::parse("#geral").is_err());
        assert!(DirectPair::parse("dm-12-4").is_err());
        assert!(DirectPair::parse("dm-1").is_err());
        assert!(DirectPair::parse("dm-1-2-3").is_err());
        assert!(DirectPair::parse("dm-a-b").is_err());
        assert!(DirectPair::parse("dm--1-2").is_err());
    }

    #[test]
    fn room_kind_follows_name_shape() {
        assert_eq!(Room::new(RoomId(1), "#geral").kind(), RoomKind::Public);
        assert_eq!(Room::new(RoomId(2), "dm-1-2").kind(), RoomKind::Direct);
    }

    #[test]
    fn direct_room_admits_only_participants() {
        let room = Room::new(RoomId(2), "dm-1-2");
        assert!(room.admits(UserId(1)));
        assert!(room.admits(UserId(2)));
        assert!(!room.admits(UserId(3)));
        assert!(Room::new(RoomId(1), "#jogos").admits(UserId(3)));
    }
}
