//! Error types for sheetcalc-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from addressing, the cell store and workbook validation
#[derive(Debug, Error)]
pub enum Error {
    /// Text that is neither an A1 nor an R1C1 address
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Text that is not a `start:end` range
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// 0-based row index past the last row
    #[error("Row {0} is past the last row ({1})")]
    RowOutOfBounds(u32, u32),

    /// 0-based column index past the last column
    #[error("Column {0} is past the last column ({1})")]
    ColumnOutOfBounds(u32, u16),

    /// Write to a sheet the store does not know
    #[error("No sheet named '{0}'")]
    SheetNotFound(String),

    /// Two sheets whose names differ only in case or surrounding whitespace
    #[error("Sheet '{0}' is declared more than once")]
    DuplicateSheetName(String),

    /// A sheet declares the same formula cell twice
    #[error("Cell {cell} is declared more than once on sheet '{sheet}'")]
    DuplicateCell { sheet: String, cell: String },
}
