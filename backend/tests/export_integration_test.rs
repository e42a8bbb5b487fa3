//! Integration tests for the export endpoint
//!
//! These tests verify the full export flow through the handlers:
//! 1. Document lookup and identifier validation
//! 2. JSON row parsing with degraded fallbacks
//! 3. Archive layout, response headers and drawing attachment handling

mod common;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{text, SheetView};
use instrumentation_export::api::export::{
    export_document, get_instrumentation_files_excel, post_instrumentation_files_excel,
    ExportParams,
};
use instrumentation_export::config::Config;
use instrumentation_export::services::attachments::FileService;
use instrumentation_export::state::{AppState, SharedState};
use instrumentation_export::store::{FileRecord, InstrumentationFile};
use std::io::{Cursor, Read};
use tempfile::TempDir;
use zip::ZipArchive;

/// Site with both templates installed and an empty database
async fn create_test_site() -> (SharedState, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    common::install_templates(&temp_dir.path().join("private").join("files"));
    let state = AppState::open(Config::for_site(temp_dir.path()))
        .await
        .expect("Failed to create test state");
    (state, temp_dir)
}

async fn export_by_name(state: &SharedState, name: &str) -> Response {
    let params = ExportParams {
        name: Some(name.to_string()),
    };
    match get_instrumentation_files_excel(State(state.clone()), Query(params)).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Missing header {}", name))
        .to_str()
        .unwrap()
}

fn messages(response: &Response) -> Vec<String> {
    serde_json::from_str(header(response, "x-export-messages")).unwrap()
}

/// Archive entries as (name, content)
async fn entries(response: Response) -> Vec<(String, Vec<u8>)> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

#[tokio::test]
async fn test_export_full_document() {
    let (state, temp_dir) = create_test_site().await;

    let dwg = FileService::save_upload(
        &state.db,
        temp_dir.path(),
        "plant.dwg",
        b"DWG-DATA",
        true,
    )
    .await
    .unwrap();
    let document = InstrumentationFile::new("IF-0001".to_string())
        .with_instrumentation_data(
            r#"[{"TAG_NO": "FT-101", "OPERATING*PRESSURE*KG*CM2": "2,500"},
                {"TAG_NO": "PT-102"}, {"TAG_NO": "LT-103"}]"#,
        )
        .with_valve_data(r#"[{"VALVE_TAG": "XV-101", "VALVE_TYPE": "Gate"}]"#)
        .with_dwg_file(dwg.file_url);
    state.db.upsert_document(&document).await.unwrap();

    let response = export_by_name(&state, "IF-0001").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/zip");
    assert_eq!(
        header(&response, "content-disposition"),
        "attachment; filename=\"instrumentation_files.zip\""
    );
    assert_eq!(header(&response, "x-instrumentation-rows"), "3");
    assert_eq!(header(&response, "x-valve-rows"), "1");
    assert_eq!(
        messages(&response),
        vec![
            "Instrumentation data fetched successfully: 3 records",
            "Valve data fetched successfully: 1 records",
        ]
    );

    let entries = entries(response).await;
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["instrumentation_schedule.xlsx", "valve_list.xlsx", "plant.dwg"]
    );
    assert_eq!(entries[2].1, b"DWG-DATA");

    let schedule = SheetView::read(&entries[0].1, "Schedule");
    assert_eq!(text(&schedule.cell("B7")), "FT-101");
    assert_eq!(schedule.cell("P7"), calamine::Data::Float(2500.0));
    assert_eq!(text(&schedule.cell("B9")), "LT-103");
    assert_eq!(schedule.cell("A9"), calamine::Data::Float(3.0));
    assert_eq!(schedule.cell("A10"), calamine::Data::Empty);

    let valves = SheetView::read(&entries[1].1, "Valve List");
    assert_eq!(text(&valves.cell("B7")), "XV-101");
    assert_eq!(text(&valves.cell("C7")), "Gate");
}

#[tokio::test]
async fn test_export_without_data() {
    let (state, _temp_dir) = create_test_site().await;
    state
        .db
        .upsert_document(&InstrumentationFile::new("IF-0002".to_string()))
        .await
        .unwrap();

    let response = export_by_name(&state, "IF-0002").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-instrumentation-rows"), "0");
    assert_eq!(
        messages(&response),
        vec!["No instrumentation data found", "No valve data found"]
    );

    let entries = entries(response).await;
    assert_eq!(entries.len(), 2);
    let valves = SheetView::read(&entries[1].1, "Valve List");
    assert_eq!(text(&valves.cell("A1")), "VALVE LIST");
    assert_eq!(valves.cell("B7"), calamine::Data::Empty);
}

#[tokio::test]
async fn test_export_malformed_json_still_produces_archive() {
    let (state, _temp_dir) = create_test_site().await;
    let document = InstrumentationFile::new("IF-0003".to_string())
        .with_instrumentation_data("[{\"TAG_NO\": ")
        .with_valve_data(r#"{"VALVE_TAG": "XV-1"}"#);
    state.db.upsert_document(&document).await.unwrap();

    let response = export_by_name(&state, "IF-0003").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-instrumentation-rows"), "0");
    assert_eq!(header(&response, "x-valve-rows"), "0");

    let messages = messages(&response);
    assert_eq!(messages.len(), 2);
    assert!(messages[0].starts_with("Error parsing instrumentation data: "));
    assert!(messages[1].starts_with("Error parsing valve data: "));
    assert_eq!(entries(response).await.len(), 2);
}

#[tokio::test]
async fn test_export_skips_missing_attachment() {
    let (state, _temp_dir) = create_test_site().await;
    state
        .db
        .add_file(&FileRecord::new(
            "/private/files/gone.dwg".to_string(),
            "gone.dwg".to_string(),
            true,
            0,
        ))
        .await
        .unwrap();
    let document = InstrumentationFile::new("IF-0004".to_string())
        .with_valve_data("[]")
        .with_dwg_file("/private/files/gone.dwg");
    state.db.upsert_document(&document).await.unwrap();

    let response = export_by_name(&state, "IF-0004").await;
    assert_eq!(response.status(), StatusCode::OK);

    let messages = messages(&response);
    assert!(messages
        .iter()
        .any(|m| m.starts_with("Could not add DWG file to zip: ")));
    assert!(messages.contains(&"Valve data fetched successfully: 0 records".to_string()));

    let names: Vec<String> = entries(response).await.into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["instrumentation_schedule.xlsx", "valve_list.xlsx"]);
}

#[tokio::test]
async fn test_export_by_path() {
    let (state, _temp_dir) = create_test_site().await;
    state
        .db
        .upsert_document(&InstrumentationFile::new("IF-0005".to_string()).with_valve_data("[]"))
        .await
        .unwrap();

    let response = export_document(State(state), Path("IF-0005".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-valve-rows"), "0");
}

#[tokio::test]
async fn test_export_form_post() {
    let (state, _temp_dir) = create_test_site().await;
    let document = InstrumentationFile::new("IF-0007".to_string())
        .with_valve_data(r#"[{"VALVE_TAG": "XV-7"}]"#);
    state.db.upsert_document(&document).await.unwrap();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/method/get_instrumentation_files_excel")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("name=IF-0007"))
        .unwrap();
    let response =
        post_instrumentation_files_excel(State(state), Query(ExportParams::default()), request)
            .await
            .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-valve-rows"), "1");

    let entries = entries(response).await;
    let valves = SheetView::read(&entries[1].1, "Valve List");
    assert_eq!(text(&valves.cell("B7")), "XV-7");
}

#[tokio::test]
async fn test_export_missing_name() {
    let (state, _temp_dir) = create_test_site().await;

    let response = export_by_name(&state, "  ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "Document ID is required");
}

#[tokio::test]
async fn test_export_unknown_document() {
    let (state, _temp_dir) = create_test_site().await;

    let response = export_by_name(&state, "IF-404").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_missing_template() {
    let (state, temp_dir) = create_test_site().await;
    std::fs::remove_file(temp_dir.path().join("private/files/Valve List 1 1.xlsx")).unwrap();
    state
        .db
        .upsert_document(&InstrumentationFile::new("IF-0006".to_string()))
        .await
        .unwrap();

    let response = export_by_name(&state, "IF-0006").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
