//! Worksheet XML model
//!
//! Parses a worksheet part just deeply enough to rewrite cells and merged
//! ranges. Everything else in the part (views, column widths, print setup,
//! conditional formats, drawings) is carried through untouched, as are the
//! contents of every cell that is not overwritten. Overwriting the master
//! cell of a shared formula turns the cells that shared it into plain values.

use super::cell::{CellRange, CellRef};
use super::error::TemplateError;
use super::value::CellValue;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

type OwnedEvent = Event<'static>;

/// One `<c>` element, kept as its raw event sequence
#[derive(Debug, Clone)]
struct CellXml {
    events: Vec<OwnedEvent>,
}

impl CellXml {
    fn style(&self) -> Option<String> {
        match self.events.first() {
            Some(Event::Start(start)) | Some(Event::Empty(start)) => attr_value(start, b"s"),
            _ => None,
        }
    }

    /// `si` of the shared formula this cell defines, if it is the master
    fn shared_formula_master(&self) -> Option<String> {
        self.events.iter().find_map(|event| match event {
            Event::Start(f) | Event::Empty(f)
                if is_shared_formula(f) && attr_value(f, b"ref").is_some() =>
            {
                attr_value(f, b"si")
            }
            _ => None,
        })
    }

    /// Drop an `<f>` that refers to shared formula `si`, keeping the cached value
    fn detach_shared_formula(&mut self, si: &str) {
        let shares = |f: &BytesStart<'_>| {
            is_shared_formula(f) && attr_value(f, b"si").as_deref() == Some(si)
        };
        let mut inside = 0usize;
        self.events.retain(|event| {
            if inside > 0 {
                match event {
                    Event::Start(_) => inside += 1,
                    Event::End(_) => inside -= 1,
                    _ => {}
                }
                return false;
            }
            match event {
                Event::Empty(f) if shares(f) => false,
                Event::Start(f) if shares(f) => {
                    inside = 1;
                    false
                }
                _ => true,
            }
        });
    }
}

fn is_shared_formula(start: &BytesStart<'_>) -> bool {
    start.local_name().as_ref() == b"f" && attr_value(start, b"t").as_deref() == Some("shared")
}

/// One `<row>` element
#[derive(Debug, Clone)]
struct RowXml {
    start: BytesStart<'static>,
    cells: BTreeMap<u32, CellXml>,
    extra: Vec<OwnedEvent>,
    touched: bool,
}

/// A worksheet part
#[derive(Debug, Clone)]
pub struct SheetXml {
    part: String,
    prefix: String,
    head: Vec<OwnedEvent>,
    sheet_data: Option<BytesStart<'static>>,
    rows: BTreeMap<u32, RowXml>,
    tail: Vec<OwnedEvent>,
    merge_cells_at: Option<usize>,
    merged: Vec<CellRange>,
    dimension_at: Option<usize>,
    written: Option<CellRange>,
}

#[derive(Clone, Copy)]
enum Phase {
    Head,
    Rows,
    InRow,
    InCell(usize),
    Tail,
    InMerge,
}

impl SheetXml {
    /// Parse a worksheet part
    pub fn parse(part: &str, xml: &[u8]) -> Result<Self, TemplateError> {
        let text = std::str::from_utf8(xml).map_err(|e| TemplateError::xml(part, e))?;
        let mut reader = Reader::from_str(text);

        let mut sheet = SheetXml {
            part: part.to_string(),
            prefix: String::new(),
            head: Vec::new(),
            sheet_data: None,
            rows: BTreeMap::new(),
            tail: Vec::new(),
            merge_cells_at: None,
            merged: Vec::new(),
            dimension_at: None,
            written: None,
        };

        let mut phase = Phase::Head;
        let mut row: Option<(u32, RowXml)> = None;
        let mut cell: Option<(u32, CellXml)> = None;
        let mut last_row: u32 = 0;
        let mut last_col: u32 = 0;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| TemplateError::xml(part, e))?
                .into_owned();
            if matches!(event, Event::Eof) {
                break;
            }

            match phase {
                Phase::Head => match event {
                    Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                        sheet.prefix = element_prefix(&e);
                        sheet.sheet_data = Some(e);
                        phase = Phase::Rows;
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                        sheet.prefix = element_prefix(&e);
                        sheet.sheet_data = Some(e);
                        phase = Phase::Tail;
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"dimension" => {
                        sheet.dimension_at = Some(sheet.head.len());
                        sheet.head.push(Event::Empty(e));
                    }
                    other => sheet.head.push(other),
                },
                Phase::Rows => match event {
                    Event::Start(e) if e.local_name().as_ref() == b"row" => {
                        last_row = row_number(part, &e, last_row)?;
                        last_col = 0;
                        row = Some((last_row, RowXml::new(e)));
                        phase = Phase::InRow;
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                        last_row = row_number(part, &e, last_row)?;
                        sheet.rows.insert(last_row, RowXml::new(e));
                    }
                    Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                        phase = Phase::Tail;
                    }
                    _ => {}
                },
                Phase::InRow => match event {
                    Event::Start(e) if e.local_name().as_ref() == b"c" => {
                        last_col = cell_column(part, &e, last_col)?;
                        cell = Some((last_col, CellXml { events: vec![Event::Start(e)] }));
                        phase = Phase::InCell(1);
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                        last_col = cell_column(part, &e, last_col)?;
                        if let Some((_, current)) = row.as_mut() {
                            let events = vec![Event::Empty(e)];
                            current.cells.insert(last_col, CellXml { events });
                        }
                    }
                    Event::End(e) if e.local_name().as_ref() == b"row" => {
                        if let Some((number, current)) = row.take() {
                            sheet.rows.insert(number, current);
                        }
                        phase = Phase::Rows;
                    }
                    Event::Text(ref t) if is_whitespace(t) => {}
                    other => {
                        if let Some((_, current)) = row.as_mut() {
                            current.extra.push(other);
                        }
                    }
                },
                Phase::InCell(depth) => {
                    let depth = match &event {
                        Event::Start(_) => depth + 1,
                        Event::End(_) => depth - 1,
                        _ => depth,
                    };
                    if let Some((_, current)) = cell.as_mut() {
                        current.events.push(event);
                    }
                    if depth == 0 {
                        if let (Some((col, finished)), Some((_, current_row))) =
                            (cell.take(), row.as_mut())
                        {
                            current_row.cells.insert(col, finished);
                        }
                        phase = Phase::InRow;
                    } else {
                        phase = Phase::InCell(depth);
                    }
                }
                Phase::Tail => match event {
                    Event::Start(e) if e.local_name().as_ref() == b"mergeCells" => {
                        sheet.merge_cells_at = Some(sheet.tail.len());
                        phase = Phase::InMerge;
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"mergeCells" => {
                        sheet.merge_cells_at = Some(sheet.tail.len());
                    }
                    other => sheet.tail.push(other),
                },
                Phase::InMerge => match &event {
                    Event::Start(e) | Event::Empty(e)
                        if e.local_name().as_ref() == b"mergeCell" =>
                    {
                        if let Some(reference) = attr_value(e, b"ref") {
                            sheet.merged.push(reference.parse()?);
                        }
                    }
                    Event::End(e) if e.local_name().as_ref() == b"mergeCells" => {
                        phase = Phase::Tail;
                    }
                    _ => {}
                },
            }
        }

        if sheet.sheet_data.is_none() {
            return Err(TemplateError::xml(part, "worksheet has no sheetData"));
        }

        Ok(sheet)
    }

    /// Name of the package part this sheet was read from
    pub fn part(&self) -> &str {
        &self.part
    }

    /// Merged ranges currently defined on the sheet
    pub fn merged_ranges(&self) -> &[CellRange] {
        &self.merged
    }

    /// Remove every merged range matching `predicate`, returning the removed ranges
    pub fn unmerge_where<F>(&mut self, mut predicate: F) -> Vec<CellRange>
    where
        F: FnMut(&CellRange) -> bool,
    {
        let mut removed = Vec::new();
        self.merged.retain(|range| {
            if predicate(range) {
                removed.push(*range);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Overwrite a cell, keeping its existing style
    ///
    /// A write into the covered (non-anchor) part of a merged range removes
    /// that range first.
    pub fn set_cell(&mut self, cell: CellRef, value: &CellValue) -> Option<CellRange> {
        let blocking = self
            .merged
            .iter()
            .position(|range| range.contains(cell) && range.start != cell);
        let unmerged = blocking.map(|index| self.merged.remove(index));

        let row = self.rows.entry(cell.row).or_insert_with(|| {
            let mut start = BytesStart::new(format!("{}row", self.prefix));
            start.push_attribute(("r", cell.row.to_string().as_str()));
            RowXml::new(start)
        });
        row.touched = true;

        let existing = row.cells.get(&cell.col);
        let style = existing.and_then(CellXml::style);
        let orphaned = existing.and_then(CellXml::shared_formula_master);
        row.cells
            .insert(cell.col, build_cell(&self.prefix, cell, style.as_deref(), value));

        if let Some(si) = orphaned {
            for other in self.rows.values_mut().flat_map(|row| row.cells.values_mut()) {
                other.detach_shared_formula(&si);
            }
        }

        let single = CellRange::new(cell, cell);
        self.written = Some(match self.written {
            Some(range) => range.union(&single),
            None => single,
        });

        unmerged
    }

    /// Serialise the sheet back to XML
    pub fn to_xml(self) -> Result<Vec<u8>, TemplateError> {
        let part = self.part.clone();
        let mut out = XmlOut {
            writer: Writer::new(Vec::new()),
            part: &part,
        };

        let dimension = self.dimension_event();
        for (index, event) in self.head.into_iter().enumerate() {
            if Some(index) == self.dimension_at {
                if let Some(updated) = dimension.clone() {
                    out.write(updated)?;
                    continue;
                }
            }
            out.write(event)?;
        }

        if let Some(sheet_data) = self.sheet_data {
            let name = String::from_utf8_lossy(sheet_data.name().as_ref()).into_owned();
            if self.rows.is_empty() {
                out.write(Event::Empty(sheet_data))?;
            } else {
                out.write(Event::Start(sheet_data))?;
                for (_, row) in self.rows {
                    let row_name = String::from_utf8_lossy(row.start.name().as_ref()).into_owned();
                    let start = if row.touched {
                        without_attr(&row.start, b"spans")
                    } else {
                        row.start
                    };
                    if row.cells.is_empty() && row.extra.is_empty() {
                        out.write(Event::Empty(start))?;
                        continue;
                    }
                    out.write(Event::Start(start))?;
                    for (_, cell) in row.cells {
                        for event in cell.events {
                            out.write(event)?;
                        }
                    }
                    for event in row.extra {
                        out.write(event)?;
                    }
                    out.write(Event::End(BytesEnd::new(row_name)))?;
                }
                out.write(Event::End(BytesEnd::new(name)))?;
            }
        }

        for (index, event) in self.tail.into_iter().enumerate() {
            if Some(index) == self.merge_cells_at {
                write_merge_cells(&mut out, &self.prefix, &self.merged)?;
            }
            out.write(event)?;
        }

        Ok(out.writer.into_inner())
    }

    fn dimension_event(&self) -> Option<Event<'static>> {
        let index = self.dimension_at?;
        let written = self.written?;
        let Event::Empty(original) = &self.head[index] else {
            return None;
        };
        let current: Option<CellRange> =
            attr_value(original, b"ref").and_then(|r| r.parse().ok());
        let covered = match current {
            Some(range) => range.union(&written),
            None => written,
        };

        let mut start = without_attr(original, b"ref");
        start.push_attribute(("ref", covered.to_string().as_str()));
        Some(Event::Empty(start))
    }
}

impl RowXml {
    fn new(start: BytesStart<'static>) -> Self {
        Self {
            start,
            cells: BTreeMap::new(),
            extra: Vec::new(),
            touched: false,
        }
    }
}

struct XmlOut<'p> {
    writer: Writer<Vec<u8>>,
    part: &'p str,
}

impl XmlOut<'_> {
    fn write(&mut self, event: Event<'_>) -> Result<(), TemplateError> {
        self.writer
            .write_event(event)
            .map_err(|e| TemplateError::xml(self.part, e))
    }
}

fn write_merge_cells(
    out: &mut XmlOut<'_>,
    prefix: &str,
    merged: &[CellRange],
) -> Result<(), TemplateError> {
    // An empty <mergeCells> is not schema-valid
    if merged.is_empty() {
        return Ok(());
    }

    let mut start = BytesStart::new(format!("{}mergeCells", prefix));
    start.push_attribute(("count", merged.len().to_string().as_str()));
    out.write(Event::Start(start))?;
    for range in merged {
        let mut cell = BytesStart::new(format!("{}mergeCell", prefix));
        cell.push_attribute(("ref", range.to_string().as_str()));
        out.write(Event::Empty(cell))?;
    }
    out.write(Event::End(BytesEnd::new(format!("{}mergeCells", prefix))))
}

fn build_cell(prefix: &str, cell: CellRef, style: Option<&str>, value: &CellValue) -> CellXml {
    let name = format!("{}c", prefix);
    let mut start = BytesStart::new(name.clone());
    start.push_attribute(("r", cell.to_string().as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style));
    }

    let mut events = Vec::new();
    match value {
        CellValue::Text(text) if text.is_empty() => {
            events.push(Event::Empty(start));
        }
        CellValue::Text(text) => {
            start.push_attribute(("t", "inlineStr"));
            let mut t = BytesStart::new(format!("{}t", prefix));
            t.push_attribute(("xml:space", "preserve"));
            events.push(Event::Start(start));
            events.push(Event::Start(BytesStart::new(format!("{}is", prefix))));
            events.push(Event::Start(t));
            events.push(Event::Text(BytesText::new(text).into_owned()));
            events.push(Event::End(BytesEnd::new(format!("{}t", prefix))));
            events.push(Event::End(BytesEnd::new(format!("{}is", prefix))));
            events.push(Event::End(BytesEnd::new(name)));
        }
        CellValue::Number(number) => {
            events.extend(value_events(prefix, start, &name, &number.to_string()));
        }
        CellValue::Bool(flag) => {
            start.push_attribute(("t", "b"));
            events.extend(value_events(prefix, start, &name, if *flag { "1" } else { "0" }));
        }
    }

    CellXml { events }
}

fn value_events(
    prefix: &str,
    start: BytesStart<'static>,
    name: &str,
    text: &str,
) -> Vec<OwnedEvent> {
    vec![
        Event::Start(start),
        Event::Start(BytesStart::new(format!("{}v", prefix))),
        Event::Text(BytesText::new(text).into_owned()),
        Event::End(BytesEnd::new(format!("{}v", prefix))),
        Event::End(BytesEnd::new(name.to_string())),
    ]
}

fn row_number(part: &str, start: &BytesStart<'_>, previous: u32) -> Result<u32, TemplateError> {
    match attr_value(start, b"r") {
        Some(r) => r
            .trim()
            .parse()
            .map_err(|_| TemplateError::xml(part, format!("invalid row number '{}'", r))),
        None => Ok(previous + 1),
    }
}

fn cell_column(part: &str, start: &BytesStart<'_>, previous: u32) -> Result<u32, TemplateError> {
    match attr_value(start, b"r") {
        Some(r) => r
            .parse::<CellRef>()
            .map(|cell| cell.col)
            .map_err(|_| TemplateError::xml(part, format!("invalid cell reference '{}'", r))),
        None => Ok(previous + 1),
    }
}

pub(crate) fn element_prefix(start: &BytesStart<'_>) -> String {
    match start.name().prefix() {
        Some(prefix) => format!("{}:", String::from_utf8_lossy(prefix.as_ref())),
        None => String::new(),
    }
}

fn is_whitespace(text: &BytesText<'_>) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

/// Unescaped value of the attribute named `key`
pub(crate) fn attr_value(start: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    let attr = start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)?;
    let raw = String::from_utf8(attr.value.into_owned()).ok()?;
    quick_xml::escape::unescape(&raw)
        .ok()
        .map(|value| value.into_owned())
}

/// Copy of `start` without the attribute named `key`
pub(crate) fn without_attr(start: &BytesStart<'_>, key: &[u8]) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut copy = BytesStart::new(name);
    for attr in start.attributes().flatten() {
        if attr.key.as_ref() != key {
            copy.push_attribute(attr);
        }
    }
    copy
}
