//! Instrumentation Files document handlers
//!
//! JSON CRUD over the documents the export reads from.

use crate::error::AppError;
use crate::state::SharedState;
use crate::store::InstrumentationFile;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Listing entry for a document
#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    /// Document identifier
    pub name: String,
    /// Whether instrument rows are stored
    pub has_instrumentation_data: bool,
    /// Whether valve rows are stored
    pub has_valve_data: bool,
    /// File URL of the drawing attachment
    pub instrumentation_dwg_file_path: Option<String>,
    /// Last update (Unix timestamp)
    pub updated_at: i64,
}

impl From<InstrumentationFile> for DocumentSummary {
    fn from(document: InstrumentationFile) -> Self {
        Self {
            has_instrumentation_data: has_content(&document.instrumentation_output_data),
            has_valve_data: has_content(&document.valve_output_data),
            name: document.name,
            instrumentation_dwg_file_path: document.instrumentation_dwg_file_path,
            updated_at: document.updated_at,
        }
    }
}

fn has_content(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|raw| !raw.is_empty())
}

/// Response for listing documents
#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    /// Documents, most recently updated first
    pub documents: Vec<DocumentSummary>,
}

/// Request to create or replace a document
///
/// The row fields accept either JSON text or a JSON list, which is stored
/// as its text.
#[derive(Debug, Deserialize)]
pub struct UpsertDocumentRequest {
    /// Document identifier
    pub name: String,
    /// Instrument rows
    #[serde(default)]
    pub instrumentation_output_data: Value,
    /// Valve rows
    #[serde(default)]
    pub valve_output_data: Value,
    /// File URL of the drawing attachment
    #[serde(default)]
    pub instrumentation_dwg_file_path: Option<String>,
}

/// Stored form of a row field
fn stored_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// GET /api/instrumentation-files - List documents
pub async fn list_documents(
    State(state): State<SharedState>,
) -> Result<Json<ListDocumentsResponse>, AppError> {
    let documents = state.db.list_documents().await?;
    Ok(Json(ListDocumentsResponse {
        documents: documents.into_iter().map(DocumentSummary::from).collect(),
    }))
}

/// GET /api/instrumentation-files/:name - Fetch a document
pub async fn get_document(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<InstrumentationFile>, AppError> {
    let document = state
        .db
        .get_document(&name)
        .await?
        .ok_or(AppError::DocumentNotFound(name))?;
    Ok(Json(document))
}

/// POST /api/instrumentation-files - Create or replace a document
pub async fn upsert_document(
    State(state): State<SharedState>,
    Json(request): Json<UpsertDocumentRequest>,
) -> Result<(StatusCode, Json<InstrumentationFile>), AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Document ID is required".to_string()));
    }

    let mut document = InstrumentationFile::new(name.to_string());
    document.instrumentation_output_data = stored_text(request.instrumentation_output_data);
    document.valve_output_data = stored_text(request.valve_output_data);
    document.instrumentation_dwg_file_path = request
        .instrumentation_dwg_file_path
        .filter(|path| !path.is_empty());

    state.db.upsert_document(&document).await?;
    info!(document = %document.name, "Saved instrumentation files document");

    // Read back so an update reports the original created_at
    let saved = state
        .db
        .get_document(&document.name)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound(document.name.clone()))?;
    Ok((StatusCode::OK, Json(saved)))
}

/// DELETE /api/instrumentation-files/:name - Delete a document
pub async fn delete_document(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.db.delete_document(&name).await? {
        return Err(AppError::DocumentNotFound(name));
    }
    info!(document = %name, "Deleted instrumentation files document");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::AppState;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    async fn create_test_state() -> (SharedState, TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let state = AppState::open(Config::for_site(temp_dir.path()))
            .await
            .expect("Failed to create test state");
        (state, temp_dir)
    }

    fn request(body: Value) -> Json<UpsertDocumentRequest> {
        Json(serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_stored_text() {
        assert_eq!(stored_text(Value::Null), None);
        assert_eq!(stored_text(json!("[]")).as_deref(), Some("[]"));
        assert_eq!(
            stored_text(json!([{"TAG_NO": "FT-101"}])).as_deref(),
            Some(r#"[{"TAG_NO":"FT-101"}]"#)
        );
    }

    #[tokio::test]
    async fn test_upsert_and_get_document() {
        let (state, _temp_dir) = create_test_state().await;

        let (status, Json(saved)) = upsert_document(
            State(state.clone()),
            request(json!({
                "name": "IF-0001",
                "instrumentation_output_data": [{"TAG_NO": "FT-101"}],
                "valve_output_data": "[]",
            })),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved.valve_output_data.as_deref(), Some("[]"));
        assert_eq!(saved.instrumentation_dwg_file_path, None);

        let Json(fetched) = get_document(State(state), Path("IF-0001".to_string()))
            .await
            .unwrap();
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn test_upsert_requires_name() {
        let (state, _temp_dir) = create_test_state().await;

        let result = upsert_document(State(state), request(json!({"name": "  "}))).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_list_documents() {
        let (state, _temp_dir) = create_test_state().await;
        state
            .db
            .upsert_document(&InstrumentationFile::new("IF-0001".to_string()).with_valve_data("[]"))
            .await
            .unwrap();

        let Json(response) = list_documents(State(state)).await.unwrap();
        assert_eq!(response.documents.len(), 1);
        assert_eq!(response.documents[0].name, "IF-0001");
        assert!(!response.documents[0].has_instrumentation_data);
        assert!(response.documents[0].has_valve_data);
    }

    #[tokio::test]
    async fn test_get_nonexistent_document() {
        let (state, _temp_dir) = create_test_state().await;

        let result = get_document(State(state), Path("IF-404".to_string())).await;
        match result {
            Err(AppError::DocumentNotFound(name)) => assert_eq!(name, "IF-404"),
            other => panic!("Expected DocumentNotFound error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_document() {
        let (state, _temp_dir) = create_test_state().await;
        state
            .db
            .upsert_document(&InstrumentationFile::new("IF-0001".to_string()))
            .await
            .unwrap();

        let status = delete_document(State(state.clone()), Path("IF-0001".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let result = delete_document(State(state), Path("IF-0001".to_string())).await;
        assert!(matches!(result, Err(AppError::DocumentNotFound(_))));
    }
}
