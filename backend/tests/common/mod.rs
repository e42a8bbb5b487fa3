//! Shared helpers for integration tests
//!
//! Templates are generated with rust_xlsxwriter and results read back with
//! calamine, so the tests exercise real workbooks end to end.

#![allow(dead_code)]

use calamine::{Data, Dimensions, Range, Reader, Xlsx};
use instrumentation_export::report::cell::CellRef;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::io::Cursor;
use std::path::Path;

/// Header rows shared by both generated templates
fn write_headers(worksheet: &mut Worksheet, title: &str, headers: &[&str]) {
    let bold = Format::new().set_bold();
    worksheet.merge_range(0, 0, 0, 5, title, &bold).unwrap();
    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_string_with_format(5, col as u16, *header, &bold)
            .unwrap();
    }
}

/// Valve list template
///
/// Carries merged ranges in the data region: `A7:A8` (an unmerge column),
/// `G7:J7` (covers the written column J) and `H9:I10` (never written).
pub fn valve_template() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Valve List").unwrap();
    write_headers(worksheet, "VALVE LIST", &["S.NO", "VALVE TAG", "VALVE TYPE"]);

    let boxed = Format::new().set_border(rust_xlsxwriter::FormatBorder::Thin);
    worksheet.merge_range(6, 0, 7, 0, "", &boxed).unwrap();
    worksheet.merge_range(6, 6, 6, 9, "", &boxed).unwrap();
    worksheet.merge_range(8, 7, 9, 8, "keep", &boxed).unwrap();

    workbook.save_to_buffer().unwrap()
}

/// Instrument schedule template with a cover sheet in front of the active one
pub fn instrument_template() -> Vec<u8> {
    let mut workbook = Workbook::new();

    let mut cover = Worksheet::new();
    cover.set_name("Cover").unwrap();
    cover.write_string(0, 0, "COVER").unwrap();
    workbook.push_worksheet(cover);

    let mut schedule = Worksheet::new();
    schedule.set_name("Schedule").unwrap();
    write_headers(&mut schedule, "INSTRUMENT SCHEDULE", &["S.NO", "TAG NO", "SERVICE"]);
    schedule.merge_range(6, 1, 6, 2, "", &Format::new()).unwrap();
    schedule.set_active(true);
    workbook.push_worksheet(schedule);

    workbook.save_to_buffer().unwrap()
}

/// Write both templates into `dir` under their default names
pub fn install_templates(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("Instrument Schedule 1.xlsx"), instrument_template()).unwrap();
    std::fs::write(dir.join("Valve List 1 1.xlsx"), valve_template()).unwrap();
}

/// A worksheet read back from generated bytes
pub struct SheetView {
    pub range: Range<Data>,
    pub merged: Vec<Dimensions>,
}

impl SheetView {
    /// Read the named worksheet of an `.xlsx`
    pub fn read(bytes: &[u8], sheet: &str) -> Self {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec())).unwrap();
        workbook.load_merged_regions().unwrap();
        let range = workbook.worksheet_range(sheet).unwrap();
        let merged = workbook
            .worksheet_merge_cells(sheet)
            .unwrap_or(Ok(Vec::new()))
            .unwrap_or_default();
        Self { range, merged }
    }

    /// Value at an A1-style reference, `Data::Empty` when absent
    pub fn cell(&self, reference: &str) -> Data {
        let cell: CellRef = reference.parse().unwrap();
        self.range
            .get_value((cell.row - 1, cell.col - 1))
            .cloned()
            .unwrap_or(Data::Empty)
    }

    /// Merged ranges in A1 notation, 1-based like the sheet itself
    pub fn merged_refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = self
            .merged
            .iter()
            .map(|dims| {
                format!(
                    "{}:{}",
                    CellRef::new(dims.start.0 + 1, dims.start.1 + 1),
                    CellRef::new(dims.end.0 + 1, dims.end.1 + 1)
                )
            })
            .collect();
        refs.sort();
        refs
    }
}

/// Text of a string cell
pub fn text(data: &Data) -> &str {
    match data {
        Data::String(s) => s,
        other => panic!("Expected a string cell, got: {:?}", other),
    }
}
