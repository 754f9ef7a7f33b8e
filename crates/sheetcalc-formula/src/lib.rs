//! # sheetcalc-formula
//!
//! Formula parser and evaluator for sheetcalc.
//!
//! This crate provides:
//! - Formula parsing (text → AST)
//! - Formula evaluation (AST → value) against a [`CellResolver`]
//! - The built-in functions SUM, AVERAGE, MIN, MAX, COUNT, COUNTA, IF, ROUND, ABS
//! - A [`TraversalGuard`] for cycle detection and reference extraction for
//!   static checks
//!
//! ## Example
//!
//! ```rust
//! use sheetcalc_core::{CellAddress, CellStore};
//! use sheetcalc_formula::{evaluate, parse_formula, EvaluationContext, FormulaValue};
//!
//! let mut store = CellStore::with_sheets(["Assumptions"]);
//! store.set("Assumptions", CellAddress::parse("C3").unwrap(), 100.0.into()).unwrap();
//!
//! let ast = parse_formula("=ROUND(C3*1.2345,2)").unwrap();
//! let mut ctx = EvaluationContext::new(&mut store, "Assumptions");
//! assert_eq!(evaluate(&ast, &mut ctx).unwrap(), FormulaValue::Number(123.45));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod guard;
pub mod parser;

pub use ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
pub use dependency::{extract_references, referenced_sheets, Precedent};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{compare_values, evaluate, CellResolver, EvaluationContext, FormulaValue};
pub use guard::TraversalGuard;
pub use parser::parse_formula;
