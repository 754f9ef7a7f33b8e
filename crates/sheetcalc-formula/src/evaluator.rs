//! Formula evaluator
//!
//! Walks a formula AST and produces a value. Cell reads go through a
//! [`CellResolver`], so the caller decides what a reference means: a plain
//! store lookup, or on-demand evaluation of a formula cell that has not been
//! computed yet.

use crate::ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use sheetcalc_core::{CellAddress, CellRange, CellStore, CellValue};
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Global function registry (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

pub(crate) fn get_function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    /// The numeric members of a range, in row order
    List(Vec<f64>),
}

impl FormulaValue {
    /// Convert to number, if possible
    ///
    /// Booleans count as 1/0, numeric text is parsed and empty text is 0.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Some(0.0)
                } else {
                    s.parse().ok()
                }
            }
            FormulaValue::List(_) => None,
        }
    }

    /// Force conversion to number for arithmetic
    pub fn to_number(&self) -> FormulaResult<f64> {
        self.as_number().ok_or_else(|| {
            FormulaError::TypeMismatch(format!("expected a number, got {}", self.describe()))
        })
    }

    /// Truthiness used by IF
    ///
    /// Non-zero numbers, non-empty text, TRUE and non-empty ranges are true.
    pub fn is_truthy(&self) -> bool {
        match self {
            FormulaValue::Number(n) => *n != 0.0,
            FormulaValue::String(s) => !s.is_empty(),
            FormulaValue::Boolean(b) => *b,
            FormulaValue::List(items) => !items.is_empty(),
        }
    }

    /// Convert to string
    pub fn as_string(&self) -> FormulaResult<String> {
        match self {
            FormulaValue::Number(n) => Ok(CellValue::Number(*n).to_string()),
            FormulaValue::String(s) => Ok(s.clone()),
            FormulaValue::Boolean(true) => Ok("TRUE".to_string()),
            FormulaValue::Boolean(false) => Ok("FALSE".to_string()),
            FormulaValue::List(_) => Err(FormulaError::TypeMismatch(
                "a range cannot be used as text".into(),
            )),
        }
    }

    /// Convert to a storable cell value
    ///
    /// Booleans are stored as 1/0. A range has no single value and cannot
    /// be stored.
    pub fn into_cell_value(self) -> FormulaResult<CellValue> {
        match self {
            FormulaValue::Number(n) => Ok(CellValue::Number(finite(n, "result")?)),
            FormulaValue::String(s) => Ok(CellValue::String(s)),
            FormulaValue::Boolean(b) => Ok(b.into()),
            FormulaValue::List(_) => Err(FormulaError::TypeMismatch(
                "a range cannot be stored in a single cell".into(),
            )),
        }
    }

    fn describe(&self) -> String {
        match self {
            FormulaValue::Number(n) => n.to_string(),
            FormulaValue::String(s) => format!("text \"{}\"", s),
            FormulaValue::Boolean(b) => b.to_string().to_uppercase(),
            FormulaValue::List(items) => format!("a range of {} numbers", items.len()),
        }
    }
}

impl From<CellValue> for FormulaValue {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Number(n) => FormulaValue::Number(n),
            CellValue::String(s) => FormulaValue::String(s),
        }
    }
}

/// Source of cell values for the evaluator
///
/// A resolver may fail a read with [`FormulaError::Deferred`] to abandon the
/// evaluation until some other cell has a value; the caller retries it.
pub trait CellResolver {
    /// Value of `sheet!address`
    ///
    /// `sheet` is the name as written in the formula, or the current sheet
    /// for bare references. Unknown sheets are an error; absent cells are 0.
    fn resolve_cell(&mut self, sheet: &str, address: CellAddress) -> FormulaResult<CellValue>;

    /// Numeric members of a single-column range, in row order
    ///
    /// Other members are skipped; absent cells read as 0. The default reads
    /// every member through [`CellResolver::resolve_cell`].
    fn range_numbers(&mut self, sheet: &str, range: &CellRange) -> FormulaResult<Vec<f64>> {
        let mut numbers = Vec::new();
        for address in range.cells() {
            if let CellValue::Number(n) = self.resolve_cell(sheet, address)? {
                numbers.push(n);
            }
        }
        Ok(numbers)
    }
}

/// A bare store is a resolver that never evaluates anything
impl CellResolver for CellStore {
    fn resolve_cell(&mut self, sheet: &str, address: CellAddress) -> FormulaResult<CellValue> {
        if self.resolve_sheet(sheet).is_none() {
            return Err(FormulaError::UnknownSheet(sheet.to_string()));
        }
        Ok(self.get(sheet, address))
    }
}

/// Context for formula evaluation
pub struct EvaluationContext<'a> {
    /// Where cell values come from
    pub resolver: &'a mut dyn CellResolver,
    /// Sheet that bare references read from
    pub current_sheet: &'a str,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context
    pub fn new(resolver: &'a mut dyn CellResolver, current_sheet: &'a str) -> Self {
        Self {
            resolver,
            current_sheet,
        }
    }

    fn sheet_of<'s>(&'s self, sheet: &'s Option<String>) -> &'s str {
        sheet.as_deref().unwrap_or(self.current_sheet)
    }

    /// Get a cell value
    pub fn get_cell_value(&mut self, cell_ref: &CellReference) -> FormulaResult<FormulaValue> {
        let sheet = self.sheet_of(&cell_ref.sheet).to_string();
        let value = self.resolver.resolve_cell(&sheet, cell_ref.address)?;
        Ok(value.into())
    }

    /// Get the numeric members of a single-column range
    ///
    /// Non-numeric members are skipped; absent cells read as 0.
    pub fn get_range_values(&mut self, range_ref: &RangeReference) -> FormulaResult<FormulaValue> {
        if !range_ref.range.is_single_column() {
            return Err(FormulaError::UnsupportedRange(format!(
                "{} spans {} columns",
                range_ref.range,
                range_ref.range.col_count()
            )));
        }

        let sheet = self.sheet_of(&range_ref.sheet).to_string();
        let numbers = self.resolver.range_numbers(&sheet, &range_ref.range)?;
        Ok(FormulaValue::List(numbers))
    }
}

/// Evaluate a formula expression
pub fn evaluate(expr: &FormulaExpr, ctx: &mut EvaluationContext) -> FormulaResult<FormulaValue> {
    match expr {
        // === Literals ===
        FormulaExpr::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaExpr::String(s) => Ok(FormulaValue::String(s.clone())),
        FormulaExpr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),

        // === References ===
        FormulaExpr::CellRef(cell_ref) => ctx.get_cell_value(cell_ref),
        FormulaExpr::RangeRef(range_ref) => ctx.get_range_values(range_ref),

        // === Operators ===
        FormulaExpr::BinaryOp { op, left, right } => evaluate_binary_op(*op, left, right, ctx),
        FormulaExpr::UnaryOp { op, operand } => evaluate_unary_op(*op, operand, ctx),

        // === Functions ===
        FormulaExpr::Function { name, args } => evaluate_function(name, args, ctx),
    }
}

fn finite(n: f64, what: &str) -> FormulaResult<f64> {
    if n.is_finite() {
        Ok(n)
    } else {
        Err(FormulaError::NonFinite(format!("{} is {}", what, n)))
    }
}

/// Evaluate a binary operation
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &FormulaExpr,
    right: &FormulaExpr,
    ctx: &mut EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let left_val = evaluate(left, ctx)?;
    let right_val = evaluate(right, ctx)?;

    let arithmetic = |f: fn(f64, f64) -> f64, name: &str| -> FormulaResult<FormulaValue> {
        let l = left_val.to_number()?;
        let r = right_val.to_number()?;
        Ok(FormulaValue::Number(finite(f(l, r), name)?))
    };

    match op {
        // Arithmetic operators
        BinaryOperator::Add => arithmetic(|l, r| l + r, "sum"),
        BinaryOperator::Subtract => arithmetic(|l, r| l - r, "difference"),
        BinaryOperator::Multiply => arithmetic(|l, r| l * r, "product"),
        BinaryOperator::Divide => {
            if right_val.to_number()? == 0.0 {
                // Evaluate the left side for its own type errors first
                left_val.to_number()?;
                return Err(FormulaError::DivisionByZero);
            }
            arithmetic(|l, r| l / r, "quotient")
        }
        BinaryOperator::Power => arithmetic(f64::powf, "power"),

        // Comparison operators
        BinaryOperator::Equal => compare(&left_val, &right_val, Ordering::is_eq),
        BinaryOperator::NotEqual => compare(&left_val, &right_val, Ordering::is_ne),
        BinaryOperator::LessThan => compare(&left_val, &right_val, Ordering::is_lt),
        BinaryOperator::LessEqual => compare(&left_val, &right_val, Ordering::is_le),
        BinaryOperator::GreaterThan => compare(&left_val, &right_val, Ordering::is_gt),
        BinaryOperator::GreaterEqual => compare(&left_val, &right_val, Ordering::is_ge),

        // Concatenation
        BinaryOperator::Concat => {
            let l = left_val.as_string()?;
            let r = right_val.as_string()?;
            Ok(FormulaValue::String(l + &r))
        }
    }
}

fn compare(
    left: &FormulaValue,
    right: &FormulaValue,
    test: fn(Ordering) -> bool,
) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(test(compare_values(left, right)?)))
}

/// Compare two values for ordering (spreadsheet-style comparison)
///
/// Numbers compare numerically and text case-insensitively. Across types,
/// numbers sort before text, which sorts before booleans.
pub fn compare_values(left: &FormulaValue, right: &FormulaValue) -> FormulaResult<Ordering> {
    fn rank(value: &FormulaValue) -> u8 {
        match value {
            FormulaValue::Number(_) => 0,
            FormulaValue::String(_) => 1,
            FormulaValue::Boolean(_) => 2,
            FormulaValue::List(_) => 3,
        }
    }

    match (left, right) {
        (FormulaValue::List(_), _) | (_, FormulaValue::List(_)) => Err(
            FormulaError::TypeMismatch("a range cannot be compared".into()),
        ),
        (FormulaValue::Number(l), FormulaValue::Number(r)) => {
            Ok(l.partial_cmp(r).unwrap_or(Ordering::Equal))
        }
        (FormulaValue::String(l), FormulaValue::String(r)) => {
            Ok(l.to_lowercase().cmp(&r.to_lowercase()))
        }
        (FormulaValue::Boolean(l), FormulaValue::Boolean(r)) => Ok(l.cmp(r)),
        (l, r) => Ok(rank(l).cmp(&rank(r))),
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(
    op: UnaryOperator,
    operand: &FormulaExpr,
    ctx: &mut EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let n = evaluate(operand, ctx)?.to_number()?;

    match op {
        UnaryOperator::Negate => Ok(FormulaValue::Number(-n)),
        UnaryOperator::Percent => Ok(FormulaValue::Number(n / 100.0)),
    }
}

/// Evaluate a function call
fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &mut EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let registry = get_function_registry();

    let func = registry
        .get(name)
        .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;

    func.check_arity(args.len())?;

    // IF only evaluates the branch it selects, so IF(B2=0,0,A1/B2) is safe.
    // The other branch is passed as a 0 the implementation never picks.
    if func.name == "IF" {
        let condition = evaluate(&args[0], ctx)?;
        let selected = if condition.is_truthy() { 1 } else { 2 };

        let mut evaluated = vec![condition];
        evaluated.resize(args.len(), FormulaValue::Number(0.0));
        if let Some(branch) = args.get(selected) {
            evaluated[selected] = evaluate(branch, ctx)?;
        }
        return (func.implementation)(&evaluated);
    }

    // Evaluate arguments
    let mut evaluated_args = Vec::with_capacity(args.len());
    for arg in args {
        evaluated_args.push(evaluate(arg, ctx)?);
    }

    (func.implementation)(&evaluated_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use pretty_assertions::assert_eq;

    fn store() -> CellStore {
        let mut store = CellStore::with_sheets(["Assumptions", "PLBS"]);
        let mut put = |sheet: &str, addr: &str, value: CellValue| {
            store
                .set(sheet, CellAddress::parse(addr).unwrap(), value)
                .unwrap();
        };
        put("Assumptions", "C10", 5.0.into());
        put("Assumptions", "C11", "abc".into());
        put("Assumptions", "C12", 15.0.into());
        put("Assumptions", "H12", 0.12.into());
        put("Assumptions", "B2", 0.0.into());
        put("Assumptions", "A1", 10.0.into());
        put("Assumptions", "D1", "100".into());
        put("PLBS", "C10", 1000.0.into());
        store
    }

    fn eval_in(store: &mut CellStore, formula: &str) -> FormulaResult<FormulaValue> {
        let ast = parse_formula(formula)?;
        let mut ctx = EvaluationContext::new(store, "Assumptions");
        evaluate(&ast, &mut ctx)
    }

    fn eval(formula: &str) -> FormulaResult<FormulaValue> {
        eval_in(&mut store(), formula)
    }

    fn num(n: f64) -> FormulaValue {
        FormulaValue::Number(n)
    }

    #[test]
    fn test_evaluate_literals() {
        assert_eq!(eval("=42").unwrap(), num(42.0));
        assert_eq!(eval("=\"Hello\"").unwrap(), FormulaValue::String("Hello".into()));
        assert_eq!(eval("=TRUE").unwrap(), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_evaluate_arithmetic() {
        assert_eq!(eval("=1+2").unwrap(), num(3.0));
        assert_eq!(eval("=10-3").unwrap(), num(7.0));
        assert_eq!(eval("=4*5").unwrap(), num(20.0));
        assert_eq!(eval("=20/4").unwrap(), num(5.0));
        assert_eq!(eval("=2^10").unwrap(), num(1024.0));
        assert_eq!(eval("=2+3*4-5").unwrap(), num(9.0));
        assert_eq!(eval("=(1+2)*3").unwrap(), num(9.0));
        assert_eq!(eval("=-5").unwrap(), num(-5.0));
        assert_eq!(eval("=50%").unwrap(), num(0.5));
    }

    #[test]
    fn test_evaluate_references() {
        assert_eq!(eval("=A1*2").unwrap(), num(20.0));
        assert_eq!(eval("=PLBS!C10+C10").unwrap(), num(1005.0));
        assert_eq!(eval("=plbs!C10").unwrap(), num(1000.0));
        // Absent cells read as zero
        assert_eq!(eval("=Z99+1").unwrap(), num(1.0));
        // Numeric text takes part in arithmetic
        assert_eq!(eval("=D1/4").unwrap(), num(25.0));
    }

    #[test]
    fn test_range_skips_text_members() {
        assert_eq!(
            eval("=C10:C12").unwrap(),
            FormulaValue::List(vec![5.0, 15.0])
        );
        assert_eq!(eval("=SUM(C10:C12)").unwrap(), num(20.0));
        assert_eq!(eval("=SUM(C12:C10)").unwrap(), num(20.0));
    }

    #[test]
    fn test_range_includes_absent_cells_as_zero() {
        assert_eq!(
            eval("=C12:C14").unwrap(),
            FormulaValue::List(vec![15.0, 0.0, 0.0])
        );
        assert_eq!(eval("=AVERAGE(C12:C13)").unwrap(), num(7.5));
    }

    #[test]
    fn test_multi_column_range_is_unsupported() {
        assert!(matches!(
            eval("=SUM(A1:B2)"),
            Err(FormulaError::UnsupportedRange(_))
        ));
    }

    #[test]
    fn test_unknown_sheet() {
        assert_eq!(
            eval("=Nowhere!A1"),
            Err(FormulaError::UnknownSheet("Nowhere".into()))
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("=A1/B2"), Err(FormulaError::DivisionByZero));
        assert_eq!(eval("=1/0"), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn test_non_finite_results_fail() {
        assert!(matches!(eval("=10^400"), Err(FormulaError::NonFinite(_))));
        assert!(matches!(eval("=(-8)^0.5"), Err(FormulaError::NonFinite(_))));
    }

    #[test]
    fn test_text_in_arithmetic_is_a_type_mismatch() {
        assert!(matches!(eval("=C11+1"), Err(FormulaError::TypeMismatch(_))));
        assert!(matches!(eval("=-C11"), Err(FormulaError::TypeMismatch(_))));
        assert!(matches!(
            eval("=C10:C12+1"),
            Err(FormulaError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_evaluate_comparison() {
        assert_eq!(eval("=1<2").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=5<>5").unwrap(), FormulaValue::Boolean(false));
        assert_eq!(eval("=\"abc\"=\"ABC\"").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=1<\"a\"").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=B2=0").unwrap(), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_evaluate_concat() {
        assert_eq!(
            eval("=\"Rate: \"&H12").unwrap(),
            FormulaValue::String("Rate: 0.12".into())
        );
        assert_eq!(
            eval("=A1&\"x\"").unwrap(),
            FormulaValue::String("10x".into())
        );
    }

    #[test]
    fn test_if_is_lazy() {
        assert_eq!(eval("=IF(B2=0,0,A1/B2)").unwrap(), num(0.0));
        assert_eq!(eval("=IF(0,\"a\",\"b\")").unwrap(), FormulaValue::String("b".into()));
        assert_eq!(eval("=IF(5,\"a\",\"b\")").unwrap(), FormulaValue::String("a".into()));
        assert_eq!(eval("=IF(0,1)").unwrap(), num(0.0));
        assert_eq!(eval("=IF(C11,1,2)").unwrap(), num(1.0));
        assert_eq!(eval("=IF(\"\",1,2)").unwrap(), num(2.0));
    }

    /// Records every cell read and defers reads of one cell
    struct RecordingResolver {
        store: CellStore,
        reads: Vec<String>,
        not_ready: Option<CellAddress>,
    }

    impl CellResolver for RecordingResolver {
        fn resolve_cell(&mut self, sheet: &str, address: CellAddress) -> FormulaResult<CellValue> {
            self.reads.push(address.to_string());
            if self.not_ready == Some(address) {
                return Err(FormulaError::Deferred(address.to_string()));
            }
            self.store.resolve_cell(sheet, address)
        }
    }

    fn recording(not_ready: Option<&str>) -> RecordingResolver {
        RecordingResolver {
            store: store(),
            reads: Vec::new(),
            not_ready: not_ready.map(|a| CellAddress::parse(a).unwrap()),
        }
    }

    #[test]
    fn test_if_reads_only_the_selected_branch() {
        let mut resolver = recording(None);
        let ast = parse_formula("=IF(A1>5,C10,C12/B2)").unwrap();
        let mut ctx = EvaluationContext::new(&mut resolver, "Assumptions");
        assert_eq!(evaluate(&ast, &mut ctx).unwrap(), num(5.0));
        assert_eq!(resolver.reads, vec!["A1", "C10"]);

        let mut resolver = recording(None);
        let ast = parse_formula("=IF(A1>50,C12/B2)").unwrap();
        let mut ctx = EvaluationContext::new(&mut resolver, "Assumptions");
        assert_eq!(evaluate(&ast, &mut ctx).unwrap(), num(0.0));
        assert_eq!(resolver.reads, vec!["A1"]);
    }

    #[test]
    fn test_deferred_read_abandons_evaluation() {
        let mut resolver = recording(Some("C11"));
        let ast = parse_formula("=SUM(C10:C12)+A1").unwrap();
        let mut ctx = EvaluationContext::new(&mut resolver, "Assumptions");
        assert_eq!(
            evaluate(&ast, &mut ctx),
            Err(FormulaError::Deferred("C11".into()))
        );
        // nothing after the deferred cell is read
        assert_eq!(resolver.reads, vec!["C10", "C11"]);
    }

    #[test]
    fn test_function_errors() {
        assert_eq!(
            eval("=NPV(1,2)"),
            Err(FormulaError::UnknownFunction("NPV".into()))
        );
        assert!(matches!(
            eval("=ABS(1,2)"),
            Err(FormulaError::ArgumentCount { .. })
        ));
        assert!(matches!(
            eval("=IF(1)"),
            Err(FormulaError::ArgumentCount { .. })
        ));
    }

    #[test]
    fn test_into_cell_value() {
        assert_eq!(
            FormulaValue::Boolean(true).into_cell_value().unwrap(),
            CellValue::Number(1.0)
        );
        assert_eq!(
            FormulaValue::String("x".into()).into_cell_value().unwrap(),
            CellValue::string("x")
        );
        assert!(FormulaValue::List(vec![1.0]).into_cell_value().is_err());
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let mut store = store();
        let first = eval_in(&mut store, "=ROUND(SUM(C10:C12)*H12,2)").unwrap();
        let second = eval_in(&mut store, "=ROUND(SUM(C10:C12)*H12,2)").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, num(2.4));
    }
}
