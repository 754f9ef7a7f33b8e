//! The cell store: one sheet-qualified table of computed and supplied values

use crate::cell::{CellAddress, CellRange, CellValue};
use crate::error::{Error, Result};
use ahash::AHashMap;
use std::fmt;

/// Normalize a sheet name for lookup: surrounding whitespace is ignored and
/// letters compare case-insensitively (`"MPBF "` and `"mpbf"` match).
pub fn normalize_sheet_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Unique key for a cell: canonical sheet name plus address
///
/// Displays as `Sheet!A1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: String,
    pub address: CellAddress,
}

impl CellKey {
    /// Create a new cell key
    pub fn new<S: Into<String>>(sheet: S, address: CellAddress) -> Self {
        Self {
            sheet: sheet.into(),
            address,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.address)
    }
}

/// Per-run table of cell values keyed by sheet and address
///
/// Reads never fail: an absent cell, or a cell on a sheet the store does not
/// know, reads as numeric zero. Writes require the sheet to be registered.
#[derive(Debug, Default, Clone)]
pub struct CellStore {
    /// Canonical sheet name → cells
    sheets: AHashMap<String, AHashMap<CellAddress, CellValue>>,
    /// Normalized sheet name → canonical sheet name
    names: AHashMap<String, String>,
}

impl CellStore {
    /// Create an empty store with no sheets
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given sheets registered
    pub fn with_sheets<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut store = Self::new();
        for name in names {
            store.register_sheet(name.as_ref());
        }
        store
    }

    /// Register a sheet so values can be written to it
    ///
    /// Registering a name that normalizes to an existing sheet is a no-op.
    pub fn register_sheet(&mut self, name: &str) {
        let normalized = normalize_sheet_name(name);
        if self.names.contains_key(&normalized) {
            return;
        }
        self.names.insert(normalized, name.to_string());
        self.sheets.insert(name.to_string(), AHashMap::new());
    }

    /// Resolve a sheet name as written in a formula or input to its
    /// canonical name
    pub fn resolve_sheet(&self, name: &str) -> Option<&str> {
        if let Some((canonical, _)) = self.sheets.get_key_value(name) {
            return Some(canonical.as_str());
        }
        self.names
            .get(&normalize_sheet_name(name))
            .map(String::as_str)
    }

    /// Store a value under `sheet!address`
    pub fn set(&mut self, sheet: &str, address: CellAddress, value: CellValue) -> Result<()> {
        let canonical = self
            .resolve_sheet(sheet)
            .ok_or_else(|| Error::SheetNotFound(sheet.to_string()))?
            .to_string();

        let value = match value {
            CellValue::Number(n) => CellValue::number(n),
            other => other,
        };

        if let Some(cells) = self.sheets.get_mut(&canonical) {
            cells.insert(address, value);
        }
        Ok(())
    }

    /// Read a value; absent cells read as zero
    pub fn get(&self, sheet: &str, address: CellAddress) -> CellValue {
        self.get_opt(sheet, address)
            .cloned()
            .unwrap_or_else(CellValue::zero)
    }

    /// Read a value if the cell has been written
    pub fn get_opt(&self, sheet: &str, address: CellAddress) -> Option<&CellValue> {
        let canonical = self.resolve_sheet(sheet)?;
        self.sheets.get(canonical)?.get(&address)
    }

    /// Whether a cell has been written
    pub fn contains(&self, sheet: &str, address: CellAddress) -> bool {
        self.get_opt(sheet, address).is_some()
    }

    /// All written cells of a sheet, in row-major order
    pub fn sheet_cells(&self, sheet: &str) -> Vec<(CellAddress, &CellValue)> {
        let mut cells: Vec<(CellAddress, &CellValue)> = self
            .resolve_sheet(sheet)
            .and_then(|canonical| self.sheets.get(canonical))
            .map(|cells| cells.iter().map(|(addr, value)| (*addr, value)).collect())
            .unwrap_or_default();
        cells.sort_by_key(|(addr, _)| *addr);
        cells
    }

    /// Written cells of a sheet inside a range, in row-major order
    ///
    /// Walks whichever is smaller, the range or the sheet's cells, so a
    /// whole-column range over a sparse sheet stays cheap.
    pub fn range_cells(&self, sheet: &str, range: &CellRange) -> Vec<(CellAddress, &CellValue)> {
        let Some(cells) = self
            .resolve_sheet(sheet)
            .and_then(|canonical| self.sheets.get(canonical))
        else {
            return Vec::new();
        };

        let size = range.row_count() as u64 * range.col_count() as u64;
        let mut found: Vec<(CellAddress, &CellValue)> = if size <= cells.len() as u64 {
            range
                .cells()
                .filter_map(|addr| cells.get(&addr).map(|value| (addr, value)))
                .collect()
        } else {
            cells
                .iter()
                .filter(|(addr, _)| range.contains(addr))
                .map(|(addr, value)| (*addr, value))
                .collect()
        };
        found.sort_by_key(|(addr, _)| *addr);
        found
    }

    /// Total number of written cells across all sheets
    pub fn len(&self) -> usize {
        self.sheets.values().map(|cells| cells.len()).sum()
    }

    /// Whether no cell has been written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
