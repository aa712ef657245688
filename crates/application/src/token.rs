use domain::{Identity, UserId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// 格式错误、过期或签名不匹配
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token generation failed: {0}")]
    Issue(String),
}

/// 令牌的签发与校验。校验只证明令牌有效，不保证用户仍然存在。
pub trait TokenService: Send + Sync {
    fn issue(&self, identity: &Identity) -> Result<String, TokenError>;
    fn verify(&self, token: &str) -> Result<UserId, TokenError>;
}
