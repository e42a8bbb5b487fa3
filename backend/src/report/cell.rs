//! Cell addressing
//!
//! Conversions between A1-style references and 1-based `(row, column)`
//! coordinates, plus the rectangular ranges used by merged cells.

use super::error::TemplateError;
use std::fmt;
use std::str::FromStr;

/// Highest column a worksheet can address (`XFD`)
pub const MAX_COLUMN: u32 = 16_384;

/// Highest row a worksheet can address
pub const MAX_ROW: u32 = 1_048_576;

/// Convert column letters (`A`, `Z`, `AA`, ...) to a 1-based column index
///
/// # Returns
/// * `Ok(u32)` - Column index, `A` = 1
/// * `Err(TemplateError)` - If the letters are empty, not ASCII letters, or past `XFD`
pub fn column_index(letters: &str) -> Result<u32, TemplateError> {
    if letters.is_empty() || letters.len() > 3 {
        return Err(TemplateError::InvalidReference(letters.to_string()));
    }

    let mut index: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(TemplateError::InvalidReference(letters.to_string()));
        }
        index = index * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }

    if index > MAX_COLUMN {
        return Err(TemplateError::InvalidReference(letters.to_string()));
    }
    Ok(index)
}

/// Convert a 1-based column index back to its letters
pub fn column_letters(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = ((index - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A single cell position, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    /// Row number, 1-based
    pub row: u32,
    /// Column index, 1-based
    pub col: u32,
}

impl CellRef {
    /// Create a reference from 1-based coordinates
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl FromStr for CellRef {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.trim().chars().filter(|c| *c != '$').collect();
        let split = cleaned
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| TemplateError::InvalidReference(s.to_string()))?;
        let (letters, digits) = cleaned.split_at(split);

        let col =
            column_index(letters).map_err(|_| TemplateError::InvalidReference(s.to_string()))?;
        let row: u32 = digits
            .parse()
            .map_err(|_| TemplateError::InvalidReference(s.to_string()))?;
        if row == 0 || row > MAX_ROW {
            return Err(TemplateError::InvalidReference(s.to_string()));
        }

        Ok(Self { row, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row)
    }
}

/// A rectangular block of cells, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Top-left cell
    pub start: CellRef,
    /// Bottom-right cell
    pub end: CellRef,
}

impl CellRange {
    /// Build a range from two corners in any order
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    /// First row of the range
    pub fn min_row(&self) -> u32 {
        self.start.row
    }

    /// Last row of the range
    pub fn max_row(&self) -> u32 {
        self.end.row
    }

    /// First column of the range
    pub fn min_col(&self) -> u32 {
        self.start.col
    }

    /// Last column of the range
    pub fn max_col(&self) -> u32 {
        self.end.col
    }

    /// Whether `cell` lies inside the range
    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    /// Whether the range spans the given column
    pub fn spans_column(&self, col: u32) -> bool {
        (self.start.col..=self.end.col).contains(&col)
    }

    /// Smallest range covering both `self` and `other`
    pub fn union(&self, other: &CellRange) -> CellRange {
        CellRange {
            start: CellRef::new(
                self.start.row.min(other.start.row),
                self.start.col.min(other.start.col),
            ),
            end: CellRef::new(
                self.end.row.max(other.end.row),
                self.end.col.max(other.end.col),
            ),
        }
    }
}

impl FromStr for CellRange {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((a, b)) => Ok(CellRange::new(a.parse()?, b.parse()?)),
            None => {
                let cell: CellRef = s.parse()?;
                Ok(CellRange::new(cell, cell))
            }
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}
