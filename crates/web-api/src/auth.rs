//! JWT 令牌签发与校验

use application::{TokenError, TokenService};
use axum::http::HeaderMap;
use config::JwtConfig;
use domain::{Identity, UserId};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 id
    pub sub: String,
    pub username: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务（HS256）
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| TokenError::Invalid(err.to_string()))
    }
}

impl TokenService for JwtService {
    fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            sub: identity.id.to_string(),
            username: identity.username.as_str().to_owned(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Issue(err.to_string()))
    }

    fn verify(&self, token: &str) -> Result<UserId, TokenError> {
        let claims = self.decode_claims(token)?;
        claims
            .sub
            .parse::<UserId>()
            .map_err(|err| TokenError::Invalid(format!("bad subject: {err}")))
    }
}

/// 从 `Authorization: Bearer <token>` 中取出令牌
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use domain::Username;

    fn service(secret: &str, hours: i64) -> JwtService {
        JwtService::new(JwtConfig {
            secret: secret.to_string(),
            expiration_hours: hours,
        })
    }

    fn ana() -> Identity {
        Identity {
            id: UserId(7),
            username: Username::parse("ana").unwrap(),
            avatar_url: None,
        }
    }

    #[test]
    fn issued_token_verifies_to_same_user() {
        let jwt = service("a-very-long-test-secret-with-32-chars!", 1);
        let token = jwt.issue(&ana()).unwrap();

        assert_eq!(jwt.verify(&token).unwrap(), UserId(7));
        assert_eq!(jwt.decode_claims(&token).unwrap().username, "ana");
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let issuer = service("a-very-long-test-secret-with-32-chars!", 1);
        let other = service("another-secret-that-is-also-32-chars!!", 1);
        let token = issuer.issue(&ana()).unwrap();

        assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
        assert!(matches!(issuer.verify("not.a.jwt"), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = service("a-very-long-test-secret-with-32-chars!", -2);
        let token = jwt.issue(&ana()).unwrap();
        assert!(matches!(jwt.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));
    }
}
