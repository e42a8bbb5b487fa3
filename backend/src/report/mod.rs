//! Spreadsheet report rendering
//!
//! Populates pre-built `.xlsx` templates with data rows at fixed cell
//! coordinates. Templates are edited in place at the XML level so their
//! formatting, column widths and headers survive untouched.

pub mod cell;
pub mod error;
pub mod layout;
pub mod package;
pub mod sheet;
pub mod template;
pub mod value;

pub use error::TemplateError;
pub use layout::{Row, SheetLayout, INSTRUMENT_SCHEDULE, VALVE_LIST};
pub use template::{render_template, RenderSummary, TemplateWorkbook};
pub use value::CellValue;
