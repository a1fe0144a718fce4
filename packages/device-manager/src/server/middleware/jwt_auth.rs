use axum::http::header::AUTHORIZATION;
use axum::{middleware::Next, response::Response};
use tracing::debug;

use crate::common::Caller;

/// JWT authentication middleware
///
/// Reads the caller from the Authorization header and adds it to the request
/// extensions. Without a readable token the request continues without a
/// caller; write handlers then answer 401.
pub async fn jwt_auth_middleware(
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match extract_caller(&request) {
        Some(caller) => {
            debug!(user = %caller.user_id, admin = caller.is_admin, "authenticated caller");
            request.extensions_mut().insert(caller);
        }
        None => debug!("no valid authentication token"),
    }

    next.run(request).await
}

fn extract_caller(request: &axum::http::Request<axum::body::Body>) -> Option<Caller> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    Caller::from_authorization(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    #[test]
    fn test_extract_caller_with_bearer() {
        let token = encode(
            &Header::default(),
            &json!({"sub": "user-1"}),
            &EncodingKey::from_secret(b"gateway"),
        )
        .unwrap();
        let request = axum::http::Request::builder()
            .header("authorization", format!("Bearer {}", token))
            .body(axum::body::Body::empty())
            .unwrap();

        let caller = extract_caller(&request).unwrap();
        assert_eq!(caller.user_id, "user-1");
    }

    #[test]
    fn test_no_auth_header() {
        let request = axum::http::Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();

        assert!(extract_caller(&request).is_none());
    }
}
