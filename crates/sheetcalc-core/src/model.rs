//! Workbook model: the parsed declarative workbook description
//!
//! The document is a hierarchical mapping:
//!
//! ```yaml
//! metadata: { total_sheets: 1, total_formulas: 1 }
//! inputs:
//!   interest_rate: { sheet: Assumptions, cell_address: H12, default_value: 12 }
//! sheets:
//!   Assumptions:
//!     formulas:
//!       - { cell_address: C5, formula_text: "=C3*C4", row: 5, col: 3 }
//!     static_values:
//!       - { cell_address: C3, value: 100, row: 3, col: 3, value_type: number }
//! ```
//!
//! Sheets and inputs keep the order in which the document lists them.

use crate::cell::{CellAddress, CellValue};
use crate::error::{Error, Result};
use crate::store::normalize_sheet_name;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

/// Document-level counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkbookMetadata {
    /// Declared number of sheets
    #[serde(default)]
    pub total_sheets: Option<usize>,
    /// Declared number of formula cells across all sheets
    #[serde(default)]
    pub total_formulas: Option<usize>,
}

/// The parsed workbook description, immutable once loaded
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkbookModel {
    #[serde(default)]
    pub metadata: WorkbookMetadata,
    /// Named input catalogue, in document order
    #[serde(default, deserialize_with = "keyed_entries")]
    pub inputs: Vec<InputDefinition>,
    /// Sheets, in document order
    #[serde(default, deserialize_with = "keyed_entries")]
    pub sheets: Vec<SheetDefinition>,
}

/// One sheet of the workbook
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetDefinition {
    /// Sheet name (the mapping key in the document)
    #[serde(skip)]
    pub name: String,
    /// Formula cells; declaration order is evaluation order
    #[serde(default)]
    pub formulas: Vec<FormulaCellDef>,
    /// Literal cells
    #[serde(default)]
    pub static_values: Vec<StaticValueCellDef>,
}

/// A formula cell
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FormulaCellDef {
    #[serde(alias = "cell", alias = "address")]
    pub cell_address: CellAddress,
    #[serde(alias = "formula")]
    pub formula_text: String,
    /// 1-based row; derived from the address when the document omits it
    #[serde(default)]
    pub row: u32,
    /// 1-based column; derived from the address when the document omits it
    #[serde(default)]
    pub col: u32,
}

/// A literal cell
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StaticValueCellDef {
    #[serde(alias = "cell", alias = "address")]
    pub cell_address: CellAddress,
    pub value: CellValue,
    #[serde(default)]
    pub row: u32,
    #[serde(default)]
    pub col: u32,
    /// Declared type name; defaults to the type of `value`
    #[serde(default, alias = "type")]
    pub value_type: String,
}

/// A named external input and the cell it feeds
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputDefinition {
    /// Input key (the mapping key in the document)
    #[serde(skip)]
    pub key: String,
    pub sheet: String,
    #[serde(alias = "cell", alias = "address")]
    pub cell_address: CellAddress,
    #[serde(default, alias = "default")]
    pub default_value: Option<CellValue>,
    #[serde(default)]
    pub description: Option<String>,
}

impl WorkbookModel {
    /// Fill derived fields and check structural invariants
    ///
    /// Rejects duplicate sheet names (compared loosely, as lookups are) and
    /// formula cells declared twice on one sheet.
    pub fn finalize(mut self) -> Result<Self> {
        let mut sheet_names = HashSet::new();

        for sheet in &mut self.sheets {
            if !sheet_names.insert(normalize_sheet_name(&sheet.name)) {
                return Err(Error::DuplicateSheetName(sheet.name.clone()));
            }

            let mut formula_cells = HashSet::new();
            for formula in &mut sheet.formulas {
                if !formula_cells.insert(formula.cell_address) {
                    return Err(Error::DuplicateCell {
                        sheet: sheet.name.clone(),
                        cell: formula.cell_address.to_string(),
                    });
                }
                if formula.row == 0 {
                    formula.row = formula.cell_address.row_number();
                }
                if formula.col == 0 {
                    formula.col = formula.cell_address.col_number();
                }
            }

            for value in &mut sheet.static_values {
                if value.row == 0 {
                    value.row = value.cell_address.row_number();
                }
                if value.col == 0 {
                    value.col = value.cell_address.col_number();
                }
                if value.value_type.is_empty() {
                    value.value_type = value.value.type_name().to_string();
                }
            }
        }

        Ok(self)
    }

    /// Look up a sheet by name (case-insensitive, whitespace-trimmed)
    pub fn sheet(&self, name: &str) -> Option<&SheetDefinition> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .or_else(|| {
                let wanted = normalize_sheet_name(name);
                self.sheets
                    .iter()
                    .find(|s| normalize_sheet_name(&s.name) == wanted)
            })
    }

    /// Sheet names in document order
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }

    /// Look up an input definition by key
    pub fn input(&self, key: &str) -> Option<&InputDefinition> {
        self.inputs.iter().find(|i| i.key == key)
    }

    /// Number of formula cells across all sheets
    pub fn formula_count(&self) -> usize {
        self.sheets.iter().map(|s| s.formulas.len()).sum()
    }
}

impl SheetDefinition {
    /// Create an empty sheet
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Find the formula declared at an address
    pub fn formula_at(&self, address: CellAddress) -> Option<&FormulaCellDef> {
        self.formulas.iter().find(|f| f.cell_address == address)
    }
}

impl FormulaCellDef {
    /// Create a formula cell with row/column derived from the address
    pub fn new<S: Into<String>>(cell_address: CellAddress, formula_text: S) -> Self {
        Self {
            cell_address,
            formula_text: formula_text.into(),
            row: cell_address.row_number(),
            col: cell_address.col_number(),
        }
    }
}

impl StaticValueCellDef {
    /// Create a literal cell with row/column/type derived from its parts
    pub fn new(cell_address: CellAddress, value: CellValue) -> Self {
        Self {
            cell_address,
            row: cell_address.row_number(),
            col: cell_address.col_number(),
            value_type: value.type_name().to_string(),
            value,
        }
    }
}

/// Entries of a document mapping whose key names the entry
trait Keyed {
    fn set_key(&mut self, key: String);
}

impl Keyed for SheetDefinition {
    fn set_key(&mut self, key: String) {
        self.name = key;
    }
}

impl Keyed for InputDefinition {
    fn set_key(&mut self, key: String) {
        self.key = key;
    }
}

/// Deserialize a `name → entry` mapping into a vector that keeps document
/// order, writing each key into its entry. A null entry (`Sheet1:` with no
/// body) becomes the default entry.
fn keyed_entries<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Keyed + DefaultOrError,
{
    struct EntriesVisitor<T>(PhantomData<T>);

    impl<'de, T> Visitor<'de> for EntriesVisitor<T>
    where
        T: Deserialize<'de> + Keyed + DefaultOrError,
    {
        type Value = Vec<T>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a mapping of names to entries")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Vec<T>, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, entry)) = map.next_entry::<String, Option<T>>()? {
                let mut entry = match entry {
                    Some(entry) => entry,
                    None => T::empty(&key).map_err(de::Error::custom)?,
                };
                entry.set_key(key);
                entries.push(entry);
            }
            Ok(entries)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Vec<T>, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(EntriesVisitor(PhantomData))
}

/// How a null mapping entry is interpreted
trait DefaultOrError: Sized {
    fn empty(key: &str) -> std::result::Result<Self, String>;
}

impl DefaultOrError for SheetDefinition {
    fn empty(_key: &str) -> std::result::Result<Self, String> {
        Ok(Self::default())
    }
}

impl DefaultOrError for InputDefinition {
    fn empty(key: &str) -> std::result::Result<Self, String> {
        Err(format!("input '{}' has no definition", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "metadata": { "total_sheets": 2, "total_formulas": 2 },
        "inputs": {
            "interest_rate": { "sheet": "Assumptions", "cell": "H12", "default": 12 },
            "firm_name": { "sheet": "Assumptions", "cell_address": "R3C9" }
        },
        "sheets": {
            "Assumptions": {
                "formulas": [ { "cell": "C5", "formula": "=C3*C4" } ],
                "static_values": [ { "cell_address": "C3", "value": 100, "row": 3, "col": 3 } ]
            },
            "PLBS": {
                "formulas": [ { "cell_address": "D7", "formula_text": "=Assumptions!C5", "row": 7, "col": 4 } ]
            },
            "coverpage": null
        }
    }"#;

    fn model() -> WorkbookModel {
        serde_json::from_str::<WorkbookModel>(DOC)
            .unwrap()
            .finalize()
            .unwrap()
    }

    #[test]
    fn test_sheets_keep_document_order() {
        let model = model();
        let names: Vec<&str> = model.sheet_names().collect();
        assert_eq!(names, vec!["Assumptions", "PLBS", "coverpage"]);
        assert_eq!(model.formula_count(), 2);
        assert_eq!(model.metadata.total_sheets, Some(2));
    }

    #[test]
    fn test_derived_fields_are_filled() {
        let model = model();
        let sheet = model.sheet("assumptions").unwrap();
        let formula = &sheet.formulas[0];
        assert_eq!(formula.formula_text, "=C3*C4");
        assert_eq!((formula.row, formula.col), (5, 3));
        assert_eq!(sheet.static_values[0].value_type, "number");
    }

    #[test]
    fn test_inputs_take_their_keys() {
        let model = model();
        let rate = model.input("interest_rate").unwrap();
        assert_eq!(rate.cell_address.to_string(), "H12");
        assert_eq!(rate.default_value, Some(CellValue::Number(12.0)));

        let firm = model.input("firm_name").unwrap();
        assert_eq!(firm.cell_address.to_string(), "I3");
        assert_eq!(firm.default_value, None);
    }

    #[test]
    fn test_duplicate_formula_cells_are_rejected() {
        let doc = r#"{ "sheets": { "S": { "formulas": [
            { "cell": "A1", "formula": "=1" },
            { "cell": "A1", "formula": "=2" }
        ] } } }"#;
        let err = serde_json::from_str::<WorkbookModel>(doc)
            .unwrap()
            .finalize()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCell { .. }));
    }

    #[test]
    fn test_duplicate_sheet_names_are_rejected() {
        let doc = r#"{ "sheets": { "PLBS": {}, "plbs ": {} } }"#;
        let err = serde_json::from_str::<WorkbookModel>(doc)
            .unwrap()
            .finalize()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSheetName(_)));
    }

    #[test]
    fn test_bad_address_fails_to_deserialize() {
        let doc = r#"{ "sheets": { "S": { "formulas": [ { "cell": "1A", "formula": "=1" } ] } } }"#;
        assert!(serde_json::from_str::<WorkbookModel>(doc).is_err());
    }
}
