//! Template workbooks
//!
//! Loads a template package, finds its active worksheet, and writes the
//! populated workbook back out with the rest of the package untouched.

use super::cell::{column_index, CellRange, CellRef, MAX_ROW};
use super::error::TemplateError;
use super::layout::{Row, SheetLayout};
use super::package::{part_dir, rels_path, resolve_target, Package};
use super::sheet::{attr_value, element_prefix, without_attr, SheetXml};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::path::Path;
use tracing::debug;

const OFFICE_DOCUMENT_REL: &str = "/officeDocument";
const CALC_CHAIN_REL: &str = "/calcChain";
const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

/// Workbook children that must follow `calcPr`
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// A template workbook opened for population
#[derive(Debug, Clone)]
pub struct TemplateWorkbook {
    package: Package,
    workbook_part: String,
    sheet: SheetXml,
}

/// What happened while a layout was applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Number of data rows written
    pub rows_written: usize,
    /// Merged ranges removed before or during writing
    pub unmerged: Vec<CellRange>,
}

impl TemplateWorkbook {
    /// Load a template from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    /// Load a template from the bytes of an `.xlsx` file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateError> {
        let package = Package::from_bytes(bytes)?;
        let workbook_part = find_workbook_part(&package)?;
        let sheet_part = find_active_sheet(&package, &workbook_part)?;
        let sheet = SheetXml::parse(&sheet_part, package.require(&sheet_part)?)?;

        debug!(workbook = %workbook_part, sheet = %sheet_part, "Opened template workbook");

        Ok(Self {
            package,
            workbook_part,
            sheet,
        })
    }

    /// The active worksheet
    pub fn sheet(&self) -> &SheetXml {
        &self.sheet
    }

    /// Write `rows` into the active sheet following `layout`
    ///
    /// Merged ranges that reach the data region (last row at or after the
    /// start row) and span any of the layout's unmerge columns are removed
    /// first. Row `i` of the input lands on sheet row `start_row + i`.
    pub fn apply(
        &mut self,
        layout: &SheetLayout,
        rows: &[Row],
    ) -> Result<RenderSummary, TemplateError> {
        let unmerge_columns = layout
            .unmerge_columns
            .iter()
            .map(|letters| column_index(letters))
            .collect::<Result<Vec<_>, _>>()?;
        let columns = layout
            .columns
            .iter()
            .map(|mapping| column_index(mapping.column).map(|index| (index, mapping)))
            .collect::<Result<Vec<_>, _>>()?;
        check_row_capacity(layout.start_row, rows.len())?;

        let mut unmerged = self.sheet.unmerge_where(|range| {
            range.max_row() >= layout.start_row
                && unmerge_columns.iter().any(|col| range.spans_column(*col))
        });

        for (index, row) in rows.iter().enumerate() {
            let sheet_row = layout.start_row + index as u32;
            for (col, mapping) in &columns {
                let value = SheetLayout::resolve(mapping, index, row);
                if let Some(range) = self.sheet.set_cell(CellRef::new(sheet_row, *col), &value) {
                    debug!(range = %range, "Unmerged range covering a written cell");
                    unmerged.push(range);
                }
            }
        }

        debug!(
            layout = layout.name,
            rows = rows.len(),
            unmerged = unmerged.len(),
            "Applied layout to template"
        );

        Ok(RenderSummary {
            rows_written: rows.len(),
            unmerged,
        })
    }

    /// Serialise the workbook to `.xlsx` bytes
    pub fn save(self) -> Result<Vec<u8>, TemplateError> {
        let mut package = self.package;
        let sheet_part = self.sheet.part().to_string();
        package.set(&sheet_part, self.sheet.to_xml()?);
        drop_calc_chain(&mut package, &self.workbook_part)?;
        force_full_calc(&mut package, &self.workbook_part)?;
        package.to_bytes()
    }
}

/// Fail when `count` rows from `start_row` would run past the last sheet row
fn check_row_capacity(start_row: u32, count: usize) -> Result<(), TemplateError> {
    let last_row = u64::from(start_row) + count.saturating_sub(1) as u64;
    if last_row > u64::from(MAX_ROW) {
        return Err(TemplateError::InvalidReference(format!(
            "{} rows from row {} end past row {}",
            count, start_row, MAX_ROW
        )));
    }
    Ok(())
}

/// Open `template`, apply `layout` to `rows`, and return the workbook bytes
pub fn render_template<P: AsRef<Path>>(
    template: P,
    layout: &SheetLayout,
    rows: &[Row],
) -> Result<(Vec<u8>, RenderSummary), TemplateError> {
    let mut workbook = TemplateWorkbook::open(template)?;
    let summary = workbook.apply(layout, rows)?;
    Ok((workbook.save()?, summary))
}

/// A `<Relationship>` entry
#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    kind: String,
    target: String,
}

fn read_relationships(package: &Package, rels: &str) -> Result<Vec<Relationship>, TemplateError> {
    let Some(xml) = package.get(rels) else {
        return Ok(Vec::new());
    };
    let text = std::str::from_utf8(xml).map_err(|e| TemplateError::xml(rels, e))?;
    let mut reader = Reader::from_str(text);
    let mut relationships = Vec::new();

    loop {
        match reader.read_event().map_err(|e| TemplateError::xml(rels, e))? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                relationships.push(Relationship {
                    id: attr_value(&e, b"Id").unwrap_or_default(),
                    kind: attr_value(&e, b"Type").unwrap_or_default(),
                    target: attr_value(&e, b"Target").unwrap_or_default(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(relationships)
}

fn find_workbook_part(package: &Package) -> Result<String, TemplateError> {
    let root = read_relationships(package, "_rels/.rels")?;
    let part = root
        .iter()
        .find(|rel| rel.kind.ends_with(OFFICE_DOCUMENT_REL))
        .map(|rel| resolve_target("", &rel.target))
        .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());

    package.require(&part)?;
    Ok(part)
}

fn find_active_sheet(package: &Package, workbook_part: &str) -> Result<String, TemplateError> {
    let xml = package.require(workbook_part)?;
    let text = std::str::from_utf8(xml).map_err(|e| TemplateError::xml(workbook_part, e))?;
    let mut reader = Reader::from_str(text);

    let mut active_tab: usize = 0;
    let mut sheet_ids: Vec<String> = Vec::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| TemplateError::xml(workbook_part, e))?
        {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"workbookView" => {
                    if let Some(tab) = attr_value(&e, b"activeTab").and_then(|v| v.parse().ok()) {
                        active_tab = tab;
                    }
                }
                b"sheet" => {
                    // r:id, whatever the relationships prefix is bound to
                    let id = e
                        .attributes()
                        .flatten()
                        .find(|attr| {
                            attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some()
                        })
                        .and_then(|attr| String::from_utf8(attr.value.into_owned()).ok());
                    if let Some(id) = id {
                        sheet_ids.push(id);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if sheet_ids.is_empty() {
        return Err(TemplateError::NoWorksheets);
    }
    let rel_id = sheet_ids
        .get(active_tab)
        .unwrap_or(&sheet_ids[0])
        .clone();

    let rels = read_relationships(package, &rels_path(workbook_part))?;
    let relationship = rels
        .iter()
        .find(|rel| rel.id == rel_id)
        .ok_or_else(|| TemplateError::MissingPart(format!("relationship {}", rel_id)))?;

    let sheet_part = resolve_target(part_dir(workbook_part), &relationship.target);
    package.require(&sheet_part)?;
    Ok(sheet_part)
}

/// Remove the formula calculation chain; it may reference cells that were overwritten
fn drop_calc_chain(package: &mut Package, workbook_part: &str) -> Result<(), TemplateError> {
    let rels = rels_path(workbook_part);
    let calc_chain = read_relationships(package, &rels)?
        .into_iter()
        .find(|rel| rel.kind.ends_with(CALC_CHAIN_REL));
    let Some(calc_chain) = calc_chain else {
        return Ok(());
    };

    let part = resolve_target(part_dir(workbook_part), &calc_chain.target);
    package.remove(&part);

    let filtered = filter_empty_elements(package.require(&rels)?, &rels, |name, start| {
        name == b"Relationship"
            && attr_value(start, b"Id").as_deref() == Some(calc_chain.id.as_str())
    })?;
    package.set(&rels, filtered);

    if let Some(types) = package.get("[Content_Types].xml") {
        let part_name = format!("/{}", part);
        let filtered = filter_empty_elements(types, "[Content_Types].xml", |name, start| {
            name == b"Override"
                && attr_value(start, b"PartName").as_deref() == Some(part_name.as_str())
        })?;
        package.set("[Content_Types].xml", filtered);
    }

    debug!(part = %part, "Dropped calculation chain");
    Ok(())
}

/// Set `fullCalcOnLoad` on the workbook's `calcPr`, adding the element if absent
///
/// Cached formula results go stale once their inputs are overwritten.
fn force_full_calc(package: &mut Package, workbook_part: &str) -> Result<(), TemplateError> {
    let xml = package.require(workbook_part)?;
    let text = std::str::from_utf8(xml).map_err(|e| TemplateError::xml(workbook_part, e))?;
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut prefix = String::new();
    let mut placed = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| TemplateError::xml(workbook_part, e))?;
        let is_start = matches!(event, Event::Start(_));
        let mut before = None;

        match &event {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                if depth == 0 {
                    prefix = element_prefix(e);
                } else if depth == 1 && !placed {
                    let name = e.local_name();
                    if name.as_ref() == b"calcPr" {
                        let replaced = full_calc_pr(e);
                        let replaced = if is_start {
                            Event::Start(replaced)
                        } else {
                            Event::Empty(replaced)
                        };
                        writer
                            .write_event(replaced)
                            .map_err(|e| TemplateError::xml(workbook_part, e))?;
                        placed = true;
                        if is_start {
                            depth += 1;
                        }
                        continue;
                    }
                    if AFTER_CALC_PR.contains(&name.as_ref()) {
                        let start = BytesStart::new(format!("{}calcPr", prefix));
                        before = Some(full_calc_pr(&start));
                    }
                }
                if is_start {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !placed {
                    let start = BytesStart::new(format!("{}calcPr", prefix));
                    before = Some(full_calc_pr(&start));
                }
            }
            _ => {}
        }

        if let Some(start) = before {
            writer
                .write_event(Event::Empty(start))
                .map_err(|e| TemplateError::xml(workbook_part, e))?;
            placed = true;
        }
        writer
            .write_event(event)
            .map_err(|e| TemplateError::xml(workbook_part, e))?;
    }

    package.set(workbook_part, writer.into_inner());
    Ok(())
}

fn full_calc_pr(start: &BytesStart<'_>) -> BytesStart<'static> {
    let mut calc_pr = without_attr(start, b"fullCalcOnLoad");
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    calc_pr
}

/// Copy `xml`, leaving out empty elements for which `skip` returns true
fn filter_empty_elements<F>(xml: &[u8], part: &str, skip: F) -> Result<Vec<u8>, TemplateError>
where
    F: Fn(&[u8], &quick_xml::events::BytesStart<'_>) -> bool,
{
    let text = std::str::from_utf8(xml).map_err(|e| TemplateError::xml(part, e))?;
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::new());

    loop {
        let event = reader.read_event().map_err(|e| TemplateError::xml(part, e))?;
        match &event {
            Event::Eof => break,
            Event::Empty(e) if skip(e.local_name().as_ref(), e) => continue,
            _ => {}
        }
        writer
            .write_event(event)
            .map_err(|e| TemplateError::xml(part, e))?;
    }

    Ok(writer.into_inner())
}
