use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{api_state::ApiState, error::ApiError};

/// The authenticated caller's user id, threaded through request extensions by [`api_auth`].
///
/// Identity/credential management lives outside this crate; here the API key doubles as
/// the caller's user id, which is all downstream handlers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

pub async fn api_auth(
    State(_state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = extract_api_key(&request)
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ApiError::Unauthorized("You have to be authenticated".to_string()))?;

    request.extensions_mut().insert(UserId(api_key));

    Ok(next.run(request).await)
}

fn extract_api_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer ").map(str::trim))
        })
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request as HttpRequest};

    fn request_with_header(name: &str, value: &str) -> Request {
        let mut request = HttpRequest::builder().body(axum::body::Body::empty()).unwrap();
        request
            .headers_mut()
            .insert(name, HeaderValue::from_str(value).unwrap());
        request
    }

    #[test]
    fn extracts_from_x_api_key_header() {
        let request = request_with_header("X-API-Key", "user-42");
        assert_eq!(extract_api_key(&request), Some("user-42".to_string()));
    }

    #[test]
    fn extracts_from_bearer_authorization_header() {
        let request = request_with_header("Authorization", "Bearer user-42");
        assert_eq!(extract_api_key(&request), Some("user-42".to_string()));
    }

    #[test]
    fn missing_headers_yield_none() {
        let request = HttpRequest::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(extract_api_key(&request), None);
    }
}
