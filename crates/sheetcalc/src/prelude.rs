//! Prelude module - common imports for sheetcalc users
//!
//! ```rust
//! use sheetcalc::prelude::*;
//! ```

pub use crate::{
    // Loading
    load_workbook,
    load_workbook_async,
    parse_workbook,
    WorkbookFormat,
    // Calculation
    CalculationOutput,
    CalculationStats,
    Engine,
    EngineConfig,
    InputRules,
    SheetOrder,
    // Output
    format_output,
    OutputEnvelope,
    // Diagnostics
    Diagnostic,
    DiagnosticKind,
    Diagnostics,
    // Cell and model types
    CellAddress,
    CellValue,
    WorkbookModel,
    // Error types
    Error,
    Result,
};
