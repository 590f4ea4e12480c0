use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::web::responses::json_error;
use crate::web::webhook::secrets_match;
use crate::web::AppState;

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

/// Admin routes need `ADMIN_TOKEN` configured and presented as a bearer token.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    check_token(state.admin_token(), headers)
}

fn check_token(expected: Option<&str>, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = expected else {
        return Err(json_error(StatusCode::FORBIDDEN, "Admin access is not configured.").into_response());
    };

    match bearer_token(headers) {
        Some(token) if secrets_match(expected, token) => Ok(()),
        _ => {
            let mut response =
                json_error(StatusCode::UNAUTHORIZED, "Admin token required.").into_response();
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            Err(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parses_bearer_scheme_case_insensitively() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn rejects_missing_configuration_and_bad_tokens() {
        let err = check_token(None, &headers("Bearer abc")).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = check_token(Some("abc"), &headers("Bearer nope")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(err.headers().contains_key(header::WWW_AUTHENTICATE));

        assert!(check_token(Some("abc"), &headers("Bearer abc")).is_ok());
    }
}
