//! Template layouts
//!
//! Each layout pins where rows land in a template: the first data row, the
//! columns whose merged ranges get unmerged, and what goes in each column.

use super::value::{clean_value, coerce_number, CellValue};
use serde_json::{Map, Value};

/// One flat input record
pub type Row = Map<String, Value>;

/// Where the value of a column comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// 1-based position of the row in the input
    Serial,
    /// Field value, cleaned as text/number/bool
    Field(&'static str),
    /// Field value, coerced to a number when it looks like one
    Numeric(&'static str),
    /// Fixed text
    Constant(&'static str),
}

/// A column of the layout and its source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Column letters, e.g. `AJ`
    pub column: &'static str,
    /// Value source
    pub source: Source,
}

const fn col(column: &'static str, source: Source) -> ColumnMapping {
    ColumnMapping { column, source }
}

/// Fixed description of how rows map onto a template
#[derive(Debug, Clone, Copy)]
pub struct SheetLayout {
    /// Human-readable name used in logs
    pub name: &'static str,
    /// File name of the generated workbook inside the archive
    pub output_name: &'static str,
    /// First sheet row that receives data (1-based)
    pub start_row: u32,
    /// Merged ranges crossing these columns at or below `start_row` are unmerged
    pub unmerge_columns: &'static [&'static str],
    /// Column writes performed for every row, in order
    pub columns: &'static [ColumnMapping],
}

impl SheetLayout {
    /// Resolve the value for `mapping` given a row and its 0-based index
    pub fn resolve(mapping: &ColumnMapping, index: usize, row: &Row) -> CellValue {
        match mapping.source {
            Source::Serial => CellValue::from(index + 1),
            Source::Field(key) => clean_value(row.get(key)),
            Source::Numeric(key) => coerce_number(row.get(key)),
            Source::Constant(text) => CellValue::from(text),
        }
    }
}

/// Instrument schedule layout
pub const INSTRUMENT_SCHEDULE: SheetLayout = SheetLayout {
    name: "instrumentation",
    output_name: "instrumentation_schedule.xlsx",
    start_row: 7,
    unmerge_columns: &[
        "A", "B", "C", "E", "K", "P", "Q", "R", "S", "T", "U", "Z", "AJ", "AY",
    ],
    columns: &[
        col("A", Source::Serial),
        col("B", Source::Field("TAG_NO")),
        col("C", Source::Field("TAG_DESCRIPTION")),
        col("E", Source::Field("DISP_TEXT_0")),
        col("P", Source::Numeric("OPERATING*PRESSURE*KG*CM2")),
        col("Q", Source::Numeric("DESIGN*PRESSURE*KG*CM2")),
        col("R", Source::Numeric("OPERATING*TEMPERATURE*C")),
        col("S", Source::Numeric("DESIGN*TEMPERATURE*C")),
        col("T", Source::Numeric("OPERATING*FLOW*M3*HR")),
        col("U", Source::Numeric("DESIGN*FLOW*M3*HR")),
        col("K", Source::Field("PIPE*MATERIAL")),
        col("AJ", Source::Field("MOUNTING_TYPE")),
        col("Z", Source::Field("TANK*HEIGHT*MM")),
        col("AY", Source::Field("REMARK")),
        col("F", Source::Constant("NA")),
        col("J", Source::Constant("NA")),
        col("V", Source::Constant("NA")),
        col("AA", Source::Constant("NA")),
        col("AB", Source::Constant("NA")),
        col("AC", Source::Constant("NA")),
        col("AD", Source::Constant("NA")),
        col("AE", Source::Constant("NA")),
        col("AF", Source::Constant("NA")),
        col("AG", Source::Constant("NA")),
        col("AH", Source::Constant("NA")),
        col("AI", Source::Constant("NA")),
        col("AO", Source::Constant("NA")),
        col("AP", Source::Constant("NA")),
        col("AQ", Source::Constant("NA")),
        col("AR", Source::Constant("NA")),
        col("AS", Source::Constant("NA")),
        col("AV", Source::Constant("NA")),
        col("AW", Source::Constant("NA")),
        col("AX", Source::Constant("NA")),
    ],
};

/// Valve list layout
pub const VALVE_LIST: SheetLayout = SheetLayout {
    name: "valve",
    output_name: "valve_list.xlsx",
    start_row: 7,
    unmerge_columns: &["A", "B", "C", "D", "E", "F"],
    columns: &[
        col("A", Source::Serial),
        col("B", Source::Field("VALVE_TAG")),
        col("C", Source::Field("VALVE_TYPE")),
        col("D", Source::Constant("NA")),
        col("E", Source::Constant("NA")),
        col("F", Source::Constant("NA")),
        col("J", Source::Field("OPERATING PRESSURE (KG/CM2)")),
        col("K", Source::Field("DESIGN PRESSURE (KG/CM2)")),
        col("P", Source::Field("OPERATING TEMPERATURE (°C)")),
        col("Q", Source::Field("DESIGN TEMPERATURE (°C)")),
        col("R", Source::Field("OPERATING FLOW (M3/HR)")),
        col("S", Source::Field("DESIGN FLOW (M3/HR)")),
        col("T", Source::Field("PRESSURE CLASS")),
        col("U", Source::Field("END CONNECTION")),
        col("V", Source::Field("BODY MOC")),
        col("Z", Source::Field("DESIGN STANDARD")),
        col("AA", Source::Field("OPERATOR / ACTUATION")),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::cell::column_index;
    use serde_json::json;
    use std::collections::HashSet;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_layout_columns_are_valid_and_unique() {
        for layout in [INSTRUMENT_SCHEDULE, VALVE_LIST] {
            let mut seen = HashSet::new();
            for mapping in layout.columns {
                assert!(column_index(mapping.column).is_ok(), "{}", mapping.column);
                assert!(seen.insert(mapping.column), "duplicate {}", mapping.column);
            }
            for column in layout.unmerge_columns {
                assert!(column_index(column).is_ok());
            }
        }
    }

    #[test]
    fn test_resolve_serial_is_one_based() {
        let mapping = INSTRUMENT_SCHEDULE.columns[0];
        assert_eq!(
            SheetLayout::resolve(&mapping, 0, &Row::new()),
            CellValue::Number(1.0)
        );
        assert_eq!(
            SheetLayout::resolve(&mapping, 4, &Row::new()),
            CellValue::Number(5.0)
        );
    }

    #[test]
    fn test_resolve_numeric_field() {
        let mapping = col("P", Source::Numeric("OPERATING*PRESSURE*KG*CM2"));
        let data = row(json!({"OPERATING*PRESSURE*KG*CM2": "1,200"}));
        assert_eq!(
            SheetLayout::resolve(&mapping, 0, &data),
            CellValue::Number(1200.0)
        );
    }

    #[test]
    fn test_resolve_valve_fields_are_not_coerced() {
        let mapping = col("J", Source::Field("OPERATING PRESSURE (KG/CM2)"));
        let data = row(json!({"OPERATING PRESSURE (KG/CM2)": "12.5"}));
        assert_eq!(
            SheetLayout::resolve(&mapping, 0, &data),
            CellValue::Text("12.5".to_string())
        );
    }

    #[test]
    fn test_resolve_missing_field_is_blank() {
        let mapping = col("B", Source::Field("TAG_NO"));
        assert!(SheetLayout::resolve(&mapping, 0, &Row::new()).is_blank());
    }

    #[test]
    fn test_resolve_constant() {
        let mapping = col("F", Source::Constant("NA"));
        assert_eq!(
            SheetLayout::resolve(&mapping, 3, &Row::new()),
            CellValue::Text("NA".to_string())
        );
    }
}
