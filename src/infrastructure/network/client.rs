use crate::domain::error::AppError;
use crate::infrastructure::network::http::HttpConnection;
use reqwest::StatusCode;
use serde_json::Value;

/// GET a dashboard API resource.
///
/// Only 2xx responses count as success; anything else becomes
/// [`AppError::Api`] so the cache never stores it.
pub async fn fetch_resource(conn: &HttpConnection, path: &str) -> Result<Value, AppError> {
    let (status, body) = conn.get_json(path).await?;
    if status.is_success() {
        return Ok(body);
    }

    Err(AppError::Api(format!(
        "{} {}: {}",
        status.as_u16(),
        path,
        describe(status, &body)
    )))
}

// Backend error bodies look like {"error": "..."} or {"detail": "..."}
fn describe(status: StatusCode, body: &Value) -> String {
    let detail = ["error", "detail", "message"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str));
    match detail {
        Some(detail) => detail.to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn describe_prefers_error_field() {
        let body = json!({"error": "visualization not found"});
        assert_eq!(
            describe(StatusCode::NOT_FOUND, &body),
            "visualization not found"
        );
    }

    #[test]
    fn describe_falls_back_to_reason() {
        assert_eq!(
            describe(StatusCode::SERVICE_UNAVAILABLE, &json!("down")),
            "Service Unavailable"
        );
    }
}
