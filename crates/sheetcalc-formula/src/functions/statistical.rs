//! Counting functions

use crate::error::FormulaResult;
use crate::evaluator::FormulaValue;

/// COUNTA function
///
/// Counts numbers, booleans and non-empty text. A range contributes each of
/// its numeric members.
pub fn fn_counta(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    let count: usize = args
        .iter()
        .map(|arg| match arg {
            FormulaValue::Number(_) | FormulaValue::Boolean(_) => 1,
            FormulaValue::String(s) => usize::from(!s.is_empty()),
            FormulaValue::List(items) => items.len(),
        })
        .sum();

    Ok(FormulaValue::Number(count as f64))
}
