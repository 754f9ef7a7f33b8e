//! # sheetcalc
//!
//! Multi-sheet formula calculation engine for workbooks described as
//! declarative documents.
//!
//! A workbook document lists, per sheet, the formula cells and literal cells,
//! plus a catalogue of named inputs. Sheetcalc loads the document, applies
//! caller inputs, evaluates every formula sheet by sheet in a configured
//! order and returns the computed values together with a diagnostic for
//! every cell that degraded to zero.
//!
//! ## Features
//!
//! - YAML and JSON workbook documents, sync and async loading
//! - Formula parser and interpreter (arithmetic, comparison, concatenation,
//!   SUM, AVERAGE, MIN, MAX, COUNT, COUNTA, IF, ROUND, ABS)
//! - Sheet-qualified references and single-column ranges
//! - Circular reference detection; failures never abort a run
//! - Input aliases, unit heuristics and compatibility overrides
//! - Generic grid output and labeled statement projections
//!
//! ## Example
//!
//! ```rust
//! use sheetcalc::prelude::*;
//! use serde_json::json;
//!
//! let model = parse_workbook(
//!     r#"
//! inputs:
//!   units: { sheet: Assumptions, cell_address: C3, default_value: 10 }
//! sheets:
//!   Assumptions:
//!     formulas:
//!       - { cell_address: C5, formula_text: "=ROUND(C3*C4, 1)" }
//!     static_values:
//!       - { cell_address: C4, value: 2.345 }
//! "#,
//!     WorkbookFormat::Yaml,
//! )
//! .unwrap();
//!
//! let engine = Engine::new(EngineConfig::default());
//! let inputs = json!({ "units": 4 });
//! let output = engine.calculate(&model, inputs.as_object().unwrap());
//! assert_eq!(output.value("Assumptions", "C5").unwrap(), CellValue::Number(9.4));
//!
//! let envelope = format_output(&model, &output, engine.config(), None);
//! assert!(envelope.success);
//! ```

pub mod calculation;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod inputs;
pub mod loader;
pub mod output;
pub mod prelude;

pub use calculation::{validate_sheet_order, CalculationOutput, CalculationStats, Engine};
pub use config::{
    CellTarget, EngineConfig, InputOverride, InputRules, ProjectionLayout, ProjectionLine,
    ProjectionSection, SheetOrder,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{Error, Result};
pub use inputs::{normalize_inputs, InputReport};
pub use loader::{load_workbook, load_workbook_async, parse_workbook, WorkbookFormat};
pub use output::{format_output, OutputEnvelope, SheetOutput};

// Re-export core types
pub use sheetcalc_core::{
    CellAddress, CellKey, CellRange, CellStore, CellValue, FormulaCellDef, InputDefinition,
    SheetDefinition, StaticValueCellDef, WorkbookMetadata, WorkbookModel,
};

// Re-export formula types
pub use sheetcalc_formula::{parse_formula, FormulaError, FormulaExpr, FormulaValue};
