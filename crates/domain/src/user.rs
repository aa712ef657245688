use serde::{Deserialize, Serialize};

use crate::value_objects::{PasswordHash, UserId, Username};

/// 持久化的用户记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub password: PasswordHash,
    pub avatar_url: Option<String>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// 已认证用户的公开信息，会话期间不可变。
///
/// 这也是所有出站事件里描述用户的形状（不包含密码哈希）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: UserId,
    pub username: Username,
    pub avatar_url: Option<String>,
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            avatar_url: user.avatar_url,
        }
    }
}
