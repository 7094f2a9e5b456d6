mod handler;
mod session;

use std::collections::HashMap;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use cohort_core::{auth, AppState};

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

/// Pulls the JWT from `?token=` or an `Authorization: Bearer` header.
fn extract_token(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    if let Some(token) = query.get("token") {
        if !token.is_empty() {
            return Some(token.clone());
        }
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// The token is validated before the upgrade completes, so an
/// unauthenticated client never holds a websocket.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(token) = extract_token(&headers, &query) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let claims = match auth::validate_token(&token, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!("gateway handshake rejected: {err}");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, claims))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn token_query_param_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().expect("value"));

        let mut query = HashMap::new();
        query.insert("token".to_string(), "from-query".to_string());

        assert_eq!(
            extract_token(&headers, &query).as_deref(),
            Some("from-query")
        );
        assert_eq!(
            extract_token(&headers, &HashMap::new()).as_deref(),
            Some("from-header")
        );
        assert!(extract_token(&HeaderMap::new(), &HashMap::new()).is_none());
    }

    #[test]
    fn malformed_authorization_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Basic xyz".parse().expect("value"));
        assert!(extract_token(&headers, &HashMap::new()).is_none());
    }
}
