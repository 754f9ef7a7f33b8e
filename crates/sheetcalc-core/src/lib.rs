//! # sheetcalc-core
//!
//! Core data structures for the sheetcalc workbook engine.
//!
//! This crate provides the fundamental types used throughout sheetcalc:
//! - [`CellValue`] - A stored scalar (finite number or string)
//! - [`CellAddress`] and [`CellRange`] - Cell addressing and ranges
//! - [`CellStore`] - The sheet-qualified table of values for one run
//! - [`WorkbookModel`] - The parsed declarative workbook description
//!
//! ## Example
//!
//! ```rust
//! use sheetcalc_core::{CellAddress, CellStore, CellValue};
//!
//! let mut store = CellStore::with_sheets(["Assumptions"]);
//! let c3 = CellAddress::parse("C3").unwrap();
//! store.set("Assumptions", c3, CellValue::Number(100.0)).unwrap();
//!
//! assert_eq!(store.get("assumptions", c3), CellValue::Number(100.0));
//! assert_eq!(store.get("Assumptions", CellAddress::parse("Z9").unwrap()), CellValue::zero());
//! ```

pub mod cell;
pub mod error;
pub mod model;
pub mod store;

// Re-exports for convenience
pub use cell::{CellAddress, CellRange, CellValue};
pub use error::{Error, Result};
pub use model::{
    FormulaCellDef, InputDefinition, SheetDefinition, StaticValueCellDef, WorkbookMetadata,
    WorkbookModel,
};
pub use store::{normalize_sheet_name, CellKey, CellStore};

/// Maximum number of rows in a sheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a sheet
pub const MAX_COLS: u16 = 16_384;
