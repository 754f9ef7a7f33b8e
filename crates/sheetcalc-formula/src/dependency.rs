//! Reference extraction for static analysis of formulas

use crate::ast::{CellReference, FormulaExpr, RangeReference};
use sheetcalc_core::CellRange;

/// Cells a formula reads, with the sheet as written (`None` = own sheet)
///
/// A single cell reference is a one-cell range. Ranges are kept whole, so
/// extraction costs the same for `C1:C3` and `C1:C1048576`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precedent {
    pub sheet: Option<String>,
    pub range: CellRange,
}

impl Precedent {
    /// Whether this is a plain cell reference
    pub fn is_cell(&self) -> bool {
        self.range.start == self.range.end
    }
}

impl From<&CellReference> for Precedent {
    fn from(cell_ref: &CellReference) -> Self {
        Self {
            sheet: cell_ref.sheet.clone(),
            range: CellRange::single(cell_ref.address),
        }
    }
}

impl From<&RangeReference> for Precedent {
    fn from(range_ref: &RangeReference) -> Self {
        Self {
            sheet: range_ref.sheet.clone(),
            range: range_ref.range,
        }
    }
}

/// Extract references from a formula AST
///
/// Both branches of IF are included, so the result over-approximates what
/// one evaluation reads.
pub fn extract_references(expr: &FormulaExpr) -> Vec<Precedent> {
    let mut refs = Vec::new();
    extract_references_recursive(expr, &mut refs);
    refs
}

fn extract_references_recursive(expr: &FormulaExpr, refs: &mut Vec<Precedent>) {
    match expr {
        FormulaExpr::CellRef(cell_ref) => refs.push(cell_ref.into()),
        FormulaExpr::RangeRef(range_ref) => refs.push(range_ref.into()),
        FormulaExpr::BinaryOp { left, right, .. } => {
            extract_references_recursive(left, refs);
            extract_references_recursive(right, refs);
        }
        FormulaExpr::UnaryOp { operand, .. } => extract_references_recursive(operand, refs),
        FormulaExpr::Function { args, .. } => {
            for arg in args {
                extract_references_recursive(arg, refs);
            }
        }
        // Literals have no references
        FormulaExpr::Number(_) | FormulaExpr::String(_) | FormulaExpr::Boolean(_) => {}
    }
}

/// Names of the sheets a formula references explicitly, in first-use order
pub fn referenced_sheets(expr: &FormulaExpr) -> Vec<String> {
    let mut sheets: Vec<String> = Vec::new();
    for precedent in extract_references(expr) {
        if let Some(sheet) = precedent.sheet {
            if !sheets.contains(&sheet) {
                sheets.push(sheet);
            }
        }
    }
    sheets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_references() {
        let ast = parse_formula("=IF(A1>0,SUM(PLBS!C1:C3),Assumptions!H12)").unwrap();
        let refs: Vec<String> = extract_references(&ast)
            .into_iter()
            .map(|p| match p.sheet {
                Some(sheet) => format!("{}!{}", sheet, p.range),
                None => p.range.to_string(),
            })
            .collect();

        assert_eq!(
            refs,
            vec!["A1", "PLBS!C1:C3", "Assumptions!H12"]
        );
    }

    #[test]
    fn test_ranges_are_not_expanded() {
        let ast = parse_formula("=SUM(B!A1:XFD1048576)+C1").unwrap();
        let refs = extract_references(&ast);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].sheet.as_deref(), Some("B"));
        assert_eq!(refs[0].range.col_count(), 16384);
        assert!(!refs[0].is_cell());
        assert!(refs[1].is_cell());
    }

    #[test]
    fn test_referenced_sheets() {
        let ast = parse_formula("=PLBS!A1+RATIO!B2+PLBS!C3+D4").unwrap();
        assert_eq!(referenced_sheets(&ast), vec!["PLBS", "RATIO"]);

        let ast = parse_formula("=1+2").unwrap();
        assert!(referenced_sheets(&ast).is_empty());
    }
}
