//! Logical functions

use crate::error::FormulaResult;
use crate::evaluator::FormulaValue;

/// IF function over already-evaluated arguments
///
/// The evaluator only evaluates the branch the condition selects and passes
/// 0 in place of the other. A missing false branch yields 0.
pub fn fn_if(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    let condition = args.first().map_or(false, FormulaValue::is_truthy);

    let chosen = if condition { args.get(1) } else { args.get(2) };
    Ok(chosen.cloned().unwrap_or(FormulaValue::Number(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> FormulaValue {
        FormulaValue::String(s.into())
    }

    #[test]
    fn test_if() {
        let zero = FormulaValue::Number(0.0);
        let five = FormulaValue::Number(5.0);
        assert_eq!(fn_if(&[zero.clone(), text("a"), text("b")]).unwrap(), text("b"));
        assert_eq!(fn_if(&[five, text("a"), text("b")]).unwrap(), text("a"));
        assert_eq!(fn_if(&[zero, text("a")]).unwrap(), FormulaValue::Number(0.0));
        assert_eq!(
            fn_if(&[FormulaValue::List(vec![]), text("a"), text("b")]).unwrap(),
            text("b")
        );
    }
}
