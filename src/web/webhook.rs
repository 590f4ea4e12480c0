use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::db::PgStore;
use crate::import;
use crate::options;
use crate::tabular::RawRow;
use crate::web::responses::json_error;
use crate::web::AppState;

/// Compares secrets without short-circuiting on the first differing byte.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .iter()
        .zip(provided)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Validates a webhook body against the configured secret and extracts its rows.
pub fn authorize(configured: &str, body: &[u8]) -> Result<Vec<RawRow>, (StatusCode, &'static str)> {
    if configured.is_empty() {
        return Err((StatusCode::FORBIDDEN, "Webhook not configured."));
    }

    let payload: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let provided = payload.get("secret").and_then(Value::as_str).unwrap_or_default();
    if !secrets_match(configured, provided) {
        return Err((StatusCode::UNAUTHORIZED, "Invalid secret"));
    }

    match payload.get("rows").and_then(Value::as_array) {
        Some(rows) if !rows.is_empty() => Ok(import::rows_from_json(rows)),
        _ => Err((
            StatusCode::BAD_REQUEST,
            "Invalid payload: rows missing or incorrect.",
        )),
    }
}

pub async fn import_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let secret = state.settings().await.webhook_secret;
    let rows = match authorize(&secret, &body) {
        Ok(rows) => rows,
        Err((status, message)) => {
            warn!(status = status.as_u16(), reason = message, "webhook request rejected");
            return json_error(status, message).into_response();
        }
    };

    let store = PgStore::new(state.pool().clone());
    let summary = import::process_rows(&store, &rows, Local::now().date_naive()).await;
    info!(
        rows = rows.len(),
        created = summary.created,
        updated = summary.updated,
        "webhook import finished"
    );

    if let Err(err) = options::set(state.pool(), options::LAST_IMPORT_SUMMARY, &summary).await {
        warn!(?err, "failed to store last import summary");
    }

    (StatusCode::OK, Json(json!({ "imported": summary }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_compare_exactly() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3cres"));
        assert!(!secrets_match("s3cret", "s3cret "));
        assert!(!secrets_match("s3cret", ""));
    }

    #[test]
    fn unconfigured_secret_is_forbidden() {
        let err = authorize("", br#"{"secret":"","rows":[{"Name of Scholarship":"A"}]}"#).unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn wrong_or_missing_secret_is_unauthorized() {
        let err = authorize("abc", br#"{"secret":"xyz","rows":[]}"#).unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        let err = authorize("abc", b"not json").unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rows_must_be_a_non_empty_array() {
        for body in [
            br#"{"secret":"abc"}"#.as_slice(),
            br#"{"secret":"abc","rows":[]}"#.as_slice(),
            br#"{"secret":"abc","rows":{"Name of Scholarship":"A"}}"#.as_slice(),
        ] {
            let err = authorize("abc", body).unwrap_err();
            assert_eq!(err.0, StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn accepted_rows_keep_column_names() {
        let rows = authorize(
            "abc",
            br#"{"secret":"abc","rows":[{"Name of Scholarship":" Test Award ","Maximum Amount":5000}]}"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Name of Scholarship"], "Test Award");
        assert_eq!(rows[0]["Maximum Amount"], "5000");
    }
}
