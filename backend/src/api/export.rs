//! Export API handlers
//!
//! Serves the instrumentation archive for a document, addressed either by the
//! `name` parameter of the method endpoint or by path.

use crate::error::AppError;
use crate::services::archive::ARCHIVE_NAME;
use crate::services::export::{ExportOutcome, ExportService};
use crate::state::SharedState;
use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use tracing::warn;

/// Header carrying the export messages as a JSON list
pub const MESSAGES_HEADER: &str = "x-export-messages";
/// Header carrying the number of instrument rows written
pub const INSTRUMENTATION_ROWS_HEADER: &str = "x-instrumentation-rows";
/// Header carrying the number of valve rows written
pub const VALVE_ROWS_HEADER: &str = "x-valve-rows";

/// Export parameters, from the query string or the request body
#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    /// Document identifier
    pub name: Option<String>,
}

/// GET /api/method/get_instrumentation_files_excel?name=...
pub async fn get_instrumentation_files_excel(
    State(state): State<SharedState>,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    export(&state, params.name.as_deref()).await
}

/// POST /api/method/get_instrumentation_files_excel
///
/// `name` may come from the query string or the body (JSON, urlencoded or
/// multipart form); the query string wins.
pub async fn post_instrumentation_files_excel(
    State(state): State<SharedState>,
    Query(params): Query<ExportParams>,
    request: Request,
) -> Result<Response, AppError> {
    let name = match params.name {
        Some(name) => Some(name),
        None => body_name(request).await,
    };
    export(&state, name.as_deref()).await
}

/// `name` from a POST body, dispatched on its content type
///
/// Unreadable bodies count as carrying no name.
async fn body_name(request: Request) -> Option<String> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        match Json::<ExportParams>::from_request(request, &()).await {
            Ok(Json(params)) => params.name,
            Err(e) => {
                warn!("Ignoring unreadable JSON body: {}", e);
                None
            }
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        match Form::<ExportParams>::from_request(request, &()).await {
            Ok(Form(params)) => params.name,
            Err(e) => {
                warn!("Ignoring unreadable form body: {}", e);
                None
            }
        }
    } else if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &()).await.ok()?;
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some("name") {
                return field.text().await.ok();
            }
        }
        None
    } else {
        None
    }
}

/// GET /api/instrumentation-files/:name/export
pub async fn export_document(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    export(&state, Some(&name)).await
}

async fn export(state: &SharedState, name: Option<&str>) -> Result<Response, AppError> {
    let outcome = ExportService::export(&state.config, &state.db, name).await?;
    archive_response(outcome)
}

/// Build the binary download response for a finished export
fn archive_response(outcome: ExportOutcome) -> Result<Response, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    let disposition = format!("attachment; filename=\"{}\"", ARCHIVE_NAME);
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Invalid content disposition: {}", e))
        })?,
    );
    headers.insert(
        HeaderName::from_static(INSTRUMENTATION_ROWS_HEADER),
        HeaderValue::from(outcome.instrumentation_rows),
    );
    headers.insert(
        HeaderName::from_static(VALVE_ROWS_HEADER),
        HeaderValue::from(outcome.valve_rows),
    );

    match messages_header(&outcome.messages) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(MESSAGES_HEADER), value);
        }
        Err(e) => warn!(document = %outcome.document, "Dropping export messages header: {}", e),
    }

    Ok((StatusCode::OK, headers, outcome.archive).into_response())
}

fn messages_header(messages: &[String]) -> Result<HeaderValue, AppError> {
    let json = ascii_json(messages)?;
    HeaderValue::from_str(&json)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid header value: {}", e)))
}

/// Serialize to JSON using only visible ASCII
///
/// Everything else is written as `\uXXXX` escapes, which can only occur
/// inside string literals, so the result stays valid JSON.
fn ascii_json(messages: &[String]) -> Result<String, AppError> {
    let json = serde_json::to_string(messages)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode messages: {}", e)))?;

    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::AppState;
    use crate::store::InstrumentationFile;
    use axum::body::Body;
    use tempfile::{tempdir, TempDir};

    async fn create_test_state() -> (SharedState, TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let state = AppState::open(Config::for_site(temp_dir.path()))
            .await
            .expect("Failed to create test state");
        (state, temp_dir)
    }

    fn post_request(content_type: &str, body: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/method/get_instrumentation_files_excel")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_ascii_json_escapes_non_ascii() {
        let messages = vec![
            "Valve data fetched successfully: 2 records".to_string(),
            "Ø 50 °C µm\u{7f}".to_string(),
        ];
        let json = ascii_json(&messages).unwrap();

        assert!(json.is_ascii());
        assert!(HeaderValue::from_str(&json).is_ok());
        let decoded: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, messages);
    }

    #[test]
    fn test_ascii_json_astral_plane() {
        let messages = vec!["pump 🚰".to_string()];
        let json = ascii_json(&messages).unwrap();
        assert!(json.contains("\\ud83d\\udeb0"));
        let decoded: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, messages);
    }

    #[tokio::test]
    async fn test_get_without_name() {
        let (state, _temp_dir) = create_test_state().await;

        let result =
            get_instrumentation_files_excel(State(state), Query(ExportParams::default())).await;
        match result {
            Err(AppError::InvalidRequest(message)) => {
                assert_eq!(message, "Document ID is required")
            }
            other => panic!("Expected InvalidRequest error, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_post_reads_name_from_body() {
        let (state, _temp_dir) = create_test_state().await;

        let request = post_request("application/json", r#"{"name": "IF-404"}"#);
        let result =
            post_instrumentation_files_excel(State(state), Query(ExportParams::default()), request)
                .await;
        match result {
            Err(AppError::DocumentNotFound(name)) => assert_eq!(name, "IF-404"),
            other => panic!("Expected DocumentNotFound error, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_post_reads_name_from_form() {
        let (state, _temp_dir) = create_test_state().await;

        let request = post_request("application/x-www-form-urlencoded", "name=IF%2D404&x=1");
        let result =
            post_instrumentation_files_excel(State(state), Query(ExportParams::default()), request)
                .await;
        match result {
            Err(AppError::DocumentNotFound(name)) => assert_eq!(name, "IF-404"),
            other => panic!("Expected DocumentNotFound error, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_post_reads_name_from_multipart() {
        let (state, _temp_dir) = create_test_state().await;

        let body = "--B\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nIF-404\r\n--B--\r\n";
        let request = post_request("multipart/form-data; boundary=B", body);
        let result =
            post_instrumentation_files_excel(State(state), Query(ExportParams::default()), request)
                .await;
        assert!(matches!(result, Err(AppError::DocumentNotFound(name)) if name == "IF-404"));
    }

    #[tokio::test]
    async fn test_post_query_name_wins_over_body() {
        let (state, _temp_dir) = create_test_state().await;
        state
            .db
            .upsert_document(&InstrumentationFile::new("IF-1".to_string()))
            .await
            .unwrap();

        // Templates are absent, so a found document fails on rendering
        let params = ExportParams {
            name: Some("IF-1".to_string()),
        };
        let request = post_request("application/x-www-form-urlencoded", "name=IF-404");
        let result = post_instrumentation_files_excel(State(state), Query(params), request).await;
        assert!(matches!(result, Err(AppError::Template(_))));
    }

    #[tokio::test]
    async fn test_post_unreadable_body_has_no_name() {
        let (state, _temp_dir) = create_test_state().await;

        let request = post_request("application/json", "{\"name\": ");
        let result =
            post_instrumentation_files_excel(State(state), Query(ExportParams::default()), request)
                .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_blank_path_name() {
        let (state, _temp_dir) = create_test_state().await;

        let result = export_document(State(state), Path("   ".to_string())).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }
}
