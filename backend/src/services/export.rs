//! Instrumentation export
//!
//! Turns an Instrumentation Files document into the downloadable archive:
//! fetch document, parse its two row lists, fill both templates, zip them
//! together with the drawing attachment when there is one.
//!
//! Only a missing document identifier (or document) aborts the export.
//! Unreadable row data degrades to an empty sheet and a failed attachment is
//! left out; both are reported back as user messages.

use crate::config::Config;
use crate::error::AppError;
use crate::report::{render_template, Row, SheetLayout, INSTRUMENT_SCHEDULE, VALVE_LIST};
use crate::services::archive::ArchiveBuilder;
use crate::services::attachments::FileService;
use crate::store::DocumentDb;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Result of a successful export
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Document the archive was built from
    pub document: String,
    /// ZIP archive bytes
    pub archive: Vec<u8>,
    /// Number of instrument rows written
    pub instrumentation_rows: usize,
    /// Number of valve rows written
    pub valve_rows: usize,
    /// Archive entry name of the drawing attachment, when it was included
    pub attachment: Option<String>,
    /// User-facing messages collected along the way
    pub messages: Vec<String>,
}

/// Collects user-facing messages and mirrors them to the log
#[derive(Debug, Default)]
struct Messages {
    document: String,
    entries: Vec<String>,
}

impl Messages {
    fn info(&mut self, message: String) {
        info!(document = %self.document, "{}", message);
        self.entries.push(message);
    }

    fn warn(&mut self, message: String) {
        warn!(document = %self.document, "{}", message);
        self.entries.push(message);
    }
}

/// Parse one JSON row-list field
///
/// An absent or empty field, a parse failure, or JSON that is not a list all
/// yield an empty row set with a message. List elements that are not objects
/// become rows without fields.
fn parse_rows(field: Option<&str>, label: &str, messages: &mut Messages) -> Vec<Row> {
    let Some(raw) = field.filter(|raw| !raw.is_empty()) else {
        messages.info(format!("No {} data found", label));
        return Vec::new();
    };

    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            messages.warn(format!(
                "Error parsing {} data: expected a list of rows, found {}",
                label,
                json_kind(&other)
            ));
            return Vec::new();
        }
        Err(e) => {
            messages.warn(format!("Error parsing {} data: {}", label, e));
            return Vec::new();
        }
    };

    let rows: Vec<Row> = items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => row,
            other => {
                warn!(kind = json_kind(&other), "{} row is not an object", label);
                Row::new()
            }
        })
        .collect();

    messages.info(format!(
        "{} data fetched successfully: {} records",
        capitalize(label),
        rows.len()
    ));
    rows
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Export service
pub struct ExportService;

impl ExportService {
    /// Build the export archive for the document named `name`
    ///
    /// # Arguments
    /// * `config` - Site and template configuration
    /// * `db` - Document store
    /// * `name` - Document identifier from the request
    ///
    /// # Returns
    /// * `Ok(ExportOutcome)` - Archive plus messages
    /// * `Err(AppError)` - Missing identifier, unknown document, or a template/archive failure
    pub async fn export(
        config: &Config,
        db: &DocumentDb,
        name: Option<&str>,
    ) -> Result<ExportOutcome, AppError> {
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::InvalidRequest("Document ID is required".to_string()))?;

        let document = db
            .get_document(name)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound(name.to_string()))?;
        info!(document = %document.name, "Exporting instrumentation files");

        let mut messages = Messages {
            document: document.name.clone(),
            entries: Vec::new(),
        };

        let instrumentation = parse_rows(
            document.instrumentation_output_data.as_deref(),
            "instrumentation",
            &mut messages,
        );
        let valves = parse_rows(document.valve_output_data.as_deref(), "valve", &mut messages);

        let attachment = match document.instrumentation_dwg_file_path.as_deref() {
            Some(file_url) if !file_url.is_empty() => {
                match Self::load_attachment(config, db, file_url).await {
                    Ok(loaded) => Some(loaded),
                    Err(e) => {
                        messages.warn(format!("Could not add DWG file to zip: {}", e));
                        None
                    }
                }
            }
            _ => None,
        };

        let instrument_template = config.instrument_template_path();
        let valve_template = config.valve_template_path();
        let instrumentation_rows = instrumentation.len();
        let valve_rows = valves.len();

        let (archive, attachment, archive_warning) = tokio::task::spawn_blocking(move || {
            build_archive(
                &instrument_template,
                &instrumentation,
                &valve_template,
                &valves,
                attachment,
            )
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Export task failed: {}", e)))??;

        if let Some(warning) = archive_warning {
            messages.warn(warning);
        }

        info!(
            document = %document.name,
            instrumentation_rows,
            valve_rows,
            attachment = ?attachment,
            bytes = archive.len(),
            "Files generated successfully"
        );

        Ok(ExportOutcome {
            document: document.name,
            archive,
            instrumentation_rows,
            valve_rows,
            attachment,
            messages: messages.entries,
        })
    }

    async fn load_attachment(
        config: &Config,
        db: &DocumentDb,
        file_url: &str,
    ) -> Result<(String, Vec<u8>), AppError> {
        let file_name = FileService::file_name(file_url)
            .ok_or_else(|| AppError::InvalidPath(format!("No file name in {}", file_url)))?;
        let content = FileService::get_content(db, &config.site.site_dir, file_url).await?;
        Ok((file_name, content))
    }
}

/// Render both workbooks and zip them, plus the attachment when given
///
/// Returns the archive, the entry name of the attachment if it made it in,
/// and a warning if it did not.
fn build_archive(
    instrument_template: &Path,
    instrumentation: &[Row],
    valve_template: &Path,
    valves: &[Row],
    attachment: Option<(String, Vec<u8>)>,
) -> Result<(Vec<u8>, Option<String>, Option<String>), AppError> {
    let instrumentation_xlsx = render(instrument_template, &INSTRUMENT_SCHEDULE, instrumentation)?;
    let valve_xlsx = render(valve_template, &VALVE_LIST, valves)?;

    let mut builder = ArchiveBuilder::new();
    builder.add_file(INSTRUMENT_SCHEDULE.output_name, &instrumentation_xlsx)?;
    builder.add_file(VALVE_LIST.output_name, &valve_xlsx)?;

    let mut added = None;
    let mut warning = None;
    if let Some((file_name, content)) = attachment {
        match builder.add_file(&file_name, &content) {
            Ok(()) => added = Some(file_name),
            Err(e) => warning = Some(format!("Could not add DWG file to zip: {}", e)),
        }
    }

    Ok((builder.finish()?, added, warning))
}

fn render(template: &Path, layout: &SheetLayout, rows: &[Row]) -> Result<Vec<u8>, AppError> {
    let (bytes, summary) = render_template(template, layout, rows)?;
    info!(
        layout = layout.name,
        template = %template.display(),
        rows = summary.rows_written,
        unmerged = summary.unmerged.len(),
        "Rendered workbook"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(field: Option<&str>) -> (Vec<Row>, Vec<String>) {
        let mut messages = Messages::default();
        let rows = parse_rows(field, "valve", &mut messages);
        (rows, messages.entries)
    }

    #[test]
    fn test_parse_rows_missing_field() {
        let (rows, messages) = parse(None);
        assert!(rows.is_empty());
        assert_eq!(messages, vec!["No valve data found"]);

        let (rows, messages) = parse(Some(""));
        assert!(rows.is_empty());
        assert_eq!(messages, vec!["No valve data found"]);
    }

    #[test]
    fn test_parse_rows_success() {
        let (rows, messages) = parse(Some(r#"[{"VALVE_TAG": "XV-1"}, {"VALVE_TAG": "XV-2"}]"#));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["VALVE_TAG"], "XV-2");
        assert_eq!(messages, vec!["Valve data fetched successfully: 2 records"]);
    }

    #[test]
    fn test_parse_rows_invalid_json() {
        let (rows, messages) = parse(Some("[{\"VALVE_TAG\": "));
        assert!(rows.is_empty());
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Error parsing valve data: "));
    }

    #[test]
    fn test_parse_rows_not_a_list() {
        let (rows, messages) = parse(Some(r#"{"VALVE_TAG": "XV-1"}"#));
        assert!(rows.is_empty());
        assert_eq!(
            messages,
            vec!["Error parsing valve data: expected a list of rows, found an object"]
        );
    }

    #[test]
    fn test_parse_rows_non_object_items_become_empty_rows() {
        let (rows, _) = parse(Some(r#"[1, {"VALVE_TAG": "XV-1"}, null]"#));
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_empty());
        assert!(rows[2].is_empty());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("instrumentation"), "Instrumentation");
        assert_eq!(capitalize(""), "");
    }
}
