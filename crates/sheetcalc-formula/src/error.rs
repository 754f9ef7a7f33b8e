//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during formula parsing or evaluation
///
/// None of these abort a calculation run: the engine stores `0` for the
/// failing cell and records the error as a diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Operand of the wrong type (text in arithmetic, a range used as a scalar)
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Result is NaN or infinite
    #[error("Result is not a finite number: {0}")]
    NonFinite(String),

    /// The cell is already being evaluated further up the chain
    #[error("Circular reference at {0}")]
    CircularReference(String),

    /// Reference to a sheet the workbook does not have
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    /// Range shape the evaluator does not support (more than one column)
    #[error("Unsupported range: {0}")]
    UnsupportedRange(String),

    /// Reference to invalid cell
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The resolver needs another cell computed first; the evaluation is
    /// abandoned and tried again later, never recorded
    #[error("Not computed yet: {0}")]
    Deferred(String),
}
