use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use application::LoginRequest;

use crate::{auth::bearer_token, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

/// 缺失的字段按空字符串处理，由登录逻辑统一报告 `missing-credentials`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let token = state
        .auth_service
        .login(LoginRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok(Json(LoginResponse { token }))
}

/// 握手前完成认证，失败时返回 401 和原因，不会建立会话
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query.token.or_else(|| bearer_token(&headers));
    let identity = state
        .auth_service
        .authenticate(token.as_deref())
        .await
        .map_err(|err| {
            tracing::info!(reason = %err, "websocket connection rejected");
            ApiError::from(err)
        })?;

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(state, identity).run(socket)))
}
