use std::sync::Arc;

use domain::{Identity, Username};

use crate::{
    error::{ApplicationError, AuthError, LoginError},
    password::PasswordHasher,
    repository::UserRepository,
    token::TokenService,
};

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub struct AuthServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub token_service: Arc<dyn TokenService>,
}

/// 登录与连接认证
pub struct AuthService {
    deps: AuthServiceDependencies,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self { deps }
    }

    /// 校验用户名密码并签发令牌
    pub async fn login(&self, request: LoginRequest) -> Result<String, LoginError> {
        if request.username.trim().is_empty() || request.password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }
        let Ok(username) = Username::parse(request.username) else {
            return Err(LoginError::InvalidCredentials);
        };

        let user = self
            .deps
            .user_repository
            .find_by_username(&username)
            .await
            .map_err(|err| internal("user lookup", err.into()))?
            .ok_or(LoginError::InvalidCredentials)?;

        let matches = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await
            .map_err(|err| internal("password verification", err.into()))?;
        if !matches {
            tracing::info!(username = %username, "login rejected");
            return Err(LoginError::InvalidCredentials);
        }

        let token = self
            .deps
            .token_service
            .issue(&user.identity())
            .map_err(|err| internal("token issue", err.into()))?;
        tracing::info!(user_id = %user.id, username = %username, "login succeeded");
        Ok(token)
    }

    /// 连接握手阶段的认证，令牌有效且用户仍存在时返回身份
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::NoToken)?;

        let user_id = self.deps.token_service.verify(token).map_err(|err| {
            tracing::debug!(error = %err, "token verification failed");
            AuthError::InvalidToken
        })?;

        match self.deps.user_repository.find_by_id(user_id).await {
            Ok(Some(user)) => Ok(user.identity()),
            Ok(None) => {
                tracing::info!(user_id = %user_id, "token refers to unknown user");
                Err(AuthError::UnknownIdentity)
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "identity lookup failed");
                Err(AuthError::Storage)
            }
        }
    }
}

fn internal(stage: &str, err: ApplicationError) -> LoginError {
    tracing::error!(stage, error = %err, "login failed");
    LoginError::Internal(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::{PasswordHash, RepositoryError, UserId};

    use crate::password::{MockPasswordHasher, PasswordHasherError};
    use crate::repository::memory::MemoryStore;
    use crate::repository::MockUserRepository;
    use crate::token::TokenError;

    struct PlainHasher;

    #[async_trait]
    impl PasswordHasher for PlainHasher {
        async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
            PasswordHash::new(format!("plain:{plaintext}"))
                .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
        }

        async fn verify(
            &self,
            plaintext: &str,
            hashed: &PasswordHash,
        ) -> Result<bool, PasswordHasherError> {
            Ok(hashed.as_str() == format!("plain:{plaintext}"))
        }
    }

    struct IdTokens;

    impl TokenService for IdTokens {
        fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
            Ok(format!("token-{}", identity.id))
        }

        fn verify(&self, token: &str) -> Result<UserId, TokenError> {
            token
                .strip_prefix("token-")
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| TokenError::Invalid("malformed".into()))
        }
    }

    async fn service() -> AuthService {
        let store = MemoryStore::new();
        let hash = PlainHasher.hash("123").await.unwrap();
        UserRepository::upsert(&store, &Username::parse("ana").unwrap(), &hash, None)
            .await
            .unwrap();
        with_users(Arc::new(store))
    }

    fn with_users(users: Arc<dyn UserRepository>) -> AuthService {
        AuthService::new(AuthServiceDependencies {
            user_repository: users,
            password_hasher: Arc::new(PlainHasher),
            token_service: Arc::new(IdTokens),
        })
    }

    fn request(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn login_issues_token_for_valid_credentials() {
        let auth = service().await;
        let token = auth.login(request("ana", "123")).await.unwrap();
        assert_eq!(token, "token-1");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_indistinguishable() {
        let auth = service().await;
        let wrong = auth.login(request("ana", "nope")).await.unwrap_err();
        let unknown = auth.login(request("maria", "123")).await.unwrap_err();
        assert!(matches!(wrong, LoginError::InvalidCredentials));
        assert!(matches!(unknown, LoginError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn blank_fields_are_missing_credentials() {
        let auth = service().await;
        assert!(matches!(
            auth.login(request("  ", "123")).await,
            Err(LoginError::MissingCredentials)
        ));
        assert!(matches!(
            auth.login(request("ana", "")).await,
            Err(LoginError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn storage_failure_during_login_is_internal() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_username()
            .returning(|_| Err(RepositoryError::storage("down")));
        let auth = with_users(Arc::new(users));

        assert!(matches!(
            auth.login(request("ana", "123")).await,
            Err(LoginError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn hasher_failure_during_login_is_internal() {
        let store = MemoryStore::new();
        UserRepository::upsert(
            &store,
            &Username::parse("ana").unwrap(),
            &PasswordHash::new("corrupted").unwrap(),
            None,
        )
        .await
        .unwrap();
        let mut hasher = MockPasswordHasher::new();
        hasher
            .expect_verify()
            .returning(|_, _| Err(PasswordHasherError::verify_error("invalid hash")));
        let auth = AuthService::new(AuthServiceDependencies {
            user_repository: Arc::new(store),
            password_hasher: Arc::new(hasher),
            token_service: Arc::new(IdTokens),
        });

        assert!(matches!(
            auth.login(request("ana", "123")).await,
            Err(LoginError::Internal(ApplicationError::Password(_)))
        ));
    }

    #[tokio::test]
    async fn authenticate_resolves_identity() {
        let auth = service().await;
        let identity = auth.authenticate(Some("token-1")).await.unwrap();
        assert_eq!(identity.username.as_str(), "ana");
    }

    #[tokio::test]
    async fn authenticate_rejections_carry_reason() {
        let auth = service().await;
        assert_eq!(auth.authenticate(None).await, Err(AuthError::NoToken));
        assert_eq!(auth.authenticate(Some("")).await, Err(AuthError::NoToken));
        assert_eq!(
            auth.authenticate(Some("garbage")).await,
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            auth.authenticate(Some("token-42")).await,
            Err(AuthError::UnknownIdentity)
        );
        assert_eq!(AuthError::NoToken.to_string(), "no token provided");
    }

    #[tokio::test]
    async fn authenticate_storage_failure_rejects() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(|_| Err(RepositoryError::storage("down")));
        let auth = with_users(Arc::new(users));

        assert_eq!(
            auth.authenticate(Some("token-1")).await,
            Err(AuthError::Storage)
        );
    }
}
