use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;
use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("token error: {0}")]
    Token(#[from] TokenError),
}

/// 连接握手阶段的认证失败。任何一种都会拒绝连接且不产生副作用。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token provided")]
    NoToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("unknown identity")]
    UnknownIdentity,
    #[error("identity lookup failed")]
    Storage,
}

/// 登录失败。未知用户和密码错误刻意合并为同一个 `InvalidCredentials`。
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("username and password are required")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("internal error: {0}")]
    Internal(#[from] ApplicationError),
}
