//! Output formatting: turns a finished run into the result envelope
//!
//! Sheets are rendered either as the generic grid (formulas, literal values
//! and a row view) or, when a [`ProjectionLayout`] is configured for them, as
//! a labeled statement built from fixed cell coordinates.

use crate::calculation::CalculationOutput;
use crate::config::{EngineConfig, ProjectionLayout};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sheetcalc_core::{CellAddress, CellStore, CellValue, SheetDefinition, WorkbookModel};
use std::collections::BTreeMap;

/// Name of the evaluation strategy, reported in every envelope
pub const APPROACH: &str = "ast-interpreter";

/// The complete result of a calculation
#[derive(Debug, Clone, Serialize)]
pub struct OutputEnvelope {
    pub success: bool,
    pub approach: String,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub metadata: OutputMetadata,
    /// Sheet name → rendered sheet
    pub data: BTreeMap<String, SheetOutput>,
    pub diagnostics: Diagnostics,
}

/// Counters for the whole workbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputMetadata {
    pub total_sheets: usize,
    pub total_formulas: usize,
    pub total_calculated: usize,
}

/// One rendered sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SheetOutput {
    Grid(GridOutput),
    Projection(ProjectionOutput),
}

/// Generic rendering of a sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GridOutput {
    pub formulas: BTreeMap<CellAddress, FormulaOutput>,
    pub values: BTreeMap<CellAddress, ValueOutput>,
    /// Row number → cell → value, every cell the store holds for the sheet
    pub rows: BTreeMap<u32, BTreeMap<CellAddress, CellValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaOutput {
    pub formula_text: String,
    pub result: CellValue,
    pub row: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueOutput {
    pub value: CellValue,
    pub row: u32,
    pub col: u32,
    #[serde(rename = "type")]
    pub value_type: String,
}

/// Labeled rendering of a statement sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionOutput {
    pub title: String,
    pub periods: Vec<String>,
    pub sections: Vec<SectionOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionOutput {
    pub key: String,
    pub title: String,
    pub lines: Vec<LineOutput>,
    /// One value per period, when the section has a total row
    pub total: Option<Vec<CellValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineOutput {
    pub key: String,
    pub label: String,
    pub values: Vec<CellValue>,
}

/// Build the envelope for a finished run
///
/// `sheets` restricts the output to the named sheets; names the workbook
/// does not have are skipped with a diagnostic.
pub fn format_output(
    model: &WorkbookModel,
    output: &CalculationOutput,
    config: &EngineConfig,
    sheets: Option<&[String]>,
) -> OutputEnvelope {
    let mut diagnostics = output.diagnostics.clone();

    let selected: Vec<&SheetDefinition> = match sheets {
        None => model.sheets.iter().collect(),
        Some(names) => {
            let mut selected: Vec<&SheetDefinition> = Vec::with_capacity(names.len());
            for name in names {
                match model.sheet(name) {
                    Some(sheet) => {
                        if !selected.iter().any(|s| std::ptr::eq(*s, sheet)) {
                            selected.push(sheet);
                        }
                    }
                    None => {
                        log::warn!("requested sheet '{}' is not in the workbook", name);
                        diagnostics.push(
                            name.as_str(),
                            DiagnosticKind::UnknownSheet,
                            "requested sheet is not in the workbook",
                        );
                    }
                }
            }
            selected
        }
    };

    let data = selected
        .into_iter()
        .map(|sheet| {
            let rendered = match config.projection_for(&sheet.name) {
                Some(layout) => SheetOutput::Projection(project(&output.store, &sheet.name, layout)),
                None => SheetOutput::Grid(grid(&output.store, sheet)),
            };
            (sheet.name.clone(), rendered)
        })
        .collect();

    OutputEnvelope {
        success: true,
        approach: APPROACH.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        metadata: OutputMetadata {
            total_sheets: model.sheets.len(),
            total_formulas: model.formula_count(),
            total_calculated: output.stats.total_calculated,
        },
        data,
        diagnostics,
    }
}

/// Generic grid view of one sheet
pub fn grid(store: &CellStore, sheet: &SheetDefinition) -> GridOutput {
    let formulas = sheet
        .formulas
        .iter()
        .map(|f| {
            let out = FormulaOutput {
                formula_text: f.formula_text.clone(),
                result: store.get(&sheet.name, f.cell_address),
                row: f.row,
                col: f.col,
            };
            (f.cell_address, out)
        })
        .collect();

    // Formula results take precedence over a literal declared on the same cell
    let values = sheet
        .static_values
        .iter()
        .filter(|v| sheet.formula_at(v.cell_address).is_none())
        .map(|v| {
            let value = store.get(&sheet.name, v.cell_address);
            let out = ValueOutput {
                value_type: value.type_name().to_string(),
                value,
                row: v.row,
                col: v.col,
            };
            (v.cell_address, out)
        })
        .collect();

    let mut rows: BTreeMap<u32, BTreeMap<CellAddress, CellValue>> = BTreeMap::new();
    for (address, value) in store.sheet_cells(&sheet.name) {
        rows.entry(address.row_number())
            .or_default()
            .insert(address, value.clone());
    }

    GridOutput {
        formulas,
        values,
        rows,
    }
}

/// Labeled statement view of one sheet
pub fn project(store: &CellStore, sheet: &str, layout: &ProjectionLayout) -> ProjectionOutput {
    let read_row = |row: u32| -> Vec<CellValue> {
        layout
            .columns
            .iter()
            .map(|column| match cell_at(column, row) {
                Some(address) => store.get(sheet, address),
                None => CellValue::zero(),
            })
            .collect()
    };

    let periods = layout
        .columns
        .iter()
        .map(|column| {
            layout
                .period_row
                .and_then(|row| cell_at(column, row))
                .and_then(|address| store.get_opt(sheet, address))
                .map(|label| label.to_string())
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| column.to_uppercase())
        })
        .collect();

    let sections = layout
        .sections
        .iter()
        .map(|section| SectionOutput {
            key: section.key.clone(),
            title: section.title.clone(),
            lines: section
                .lines
                .iter()
                .map(|line| LineOutput {
                    key: line.key.clone(),
                    label: line.label.clone(),
                    values: read_row(line.row),
                })
                .collect(),
            total: section.total_row.map(&read_row),
        })
        .collect();

    ProjectionOutput {
        title: layout.title.clone(),
        periods,
        sections,
    }
}

fn cell_at(column: &str, row: u32) -> Option<CellAddress> {
    let col = CellAddress::letters_to_column(column).ok()?;
    CellAddress::from_one_based(row, u32::from(col) + 1).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::Engine;
    use crate::config::{InputRules, ProjectionLine, ProjectionSection, SheetOrder};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};
    use sheetcalc_core::{FormulaCellDef, StaticValueCellDef};

    fn addr(s: &str) -> CellAddress {
        CellAddress::parse(s).unwrap()
    }

    fn model() -> WorkbookModel {
        let mut calc = SheetDefinition::new("Calc");
        calc.formulas = vec![FormulaCellDef::new(addr("B2"), "=B1*2")];
        calc.static_values = vec![
            StaticValueCellDef::new(addr("B1"), 21.0.into()),
            StaticValueCellDef::new(addr("A1"), "Units".into()),
        ];

        let mut plbs = SheetDefinition::new("PLBS");
        plbs.static_values = vec![
            StaticValueCellDef::new(addr("D4"), "2025".into()),
            StaticValueCellDef::new(addr("D6"), 1000.0.into()),
            StaticValueCellDef::new(addr("E6"), 1100.0.into()),
        ];
        plbs.formulas = vec![FormulaCellDef::new(addr("D7"), "=D6*0.5")];

        WorkbookModel {
            sheets: vec![calc, plbs],
            ..Default::default()
        }
        .finalize()
        .unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig {
            sheet_order: SheetOrder::new(["Calc", "PLBS"]),
            inputs: InputRules::none(),
            projections: vec![ProjectionLayout {
                sheet: "plbs".into(),
                title: "Projection".into(),
                period_row: Some(4),
                columns: vec!["D".into(), "E".into()],
                sections: vec![ProjectionSection {
                    key: "income".into(),
                    title: "Income".into(),
                    lines: vec![
                        ProjectionLine {
                            key: "revenue".into(),
                            label: "Revenue".into(),
                            row: 6,
                        },
                        ProjectionLine {
                            key: "cost".into(),
                            label: "Cost".into(),
                            row: 7,
                        },
                    ],
                    total_row: None,
                }],
            }],
            trace_unresolved: false,
        }
    }

    fn envelope(sheets: Option<&[String]>) -> OutputEnvelope {
        let model = model();
        let config = config();
        let output = Engine::new(config.clone()).calculate(&model, &Map::new());
        format_output(&model, &output, &config, sheets)
    }

    #[test]
    fn test_grid_shape() {
        let envelope = envelope(None);
        let SheetOutput::Grid(calc) = &envelope.data["Calc"] else {
            panic!("Calc should render as a grid");
        };

        assert_eq!(calc.formulas[&addr("B2")].result, CellValue::Number(42.0));
        assert_eq!(calc.formulas[&addr("B2")].row, 2);
        assert_eq!(calc.values[&addr("A1")].value_type, "string");
        assert_eq!(calc.rows[&1].len(), 2);
        assert_eq!(calc.rows[&2][&addr("B2")], CellValue::Number(42.0));
    }

    #[test]
    fn test_projection_shape() {
        let envelope = envelope(None);
        let SheetOutput::Projection(plbs) = &envelope.data["PLBS"] else {
            panic!("PLBS should render as a projection");
        };

        assert_eq!(plbs.periods, vec!["2025", "E"]);
        let lines = &plbs.sections[0].lines;
        assert_eq!(lines[0].values, vec![CellValue::Number(1000.0), CellValue::Number(1100.0)]);
        assert_eq!(lines[1].values, vec![CellValue::Number(500.0), CellValue::Number(0.0)]);
        assert_eq!(plbs.sections[0].total, None);
    }

    #[test]
    fn test_envelope_json() {
        let value = serde_json::to_value(envelope(None)).unwrap();

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["approach"], json!("ast-interpreter"));
        assert_eq!(
            value["metadata"],
            json!({ "total_sheets": 2, "total_formulas": 2, "total_calculated": 2 })
        );
        assert_eq!(value["data"]["Calc"]["formulas"]["B2"]["result"], json!(42.0));
        assert_eq!(value["data"]["Calc"]["rows"]["1"]["A1"], json!("Units"));
        assert_eq!(value["data"]["PLBS"]["sections"][0]["lines"][0]["key"], json!("revenue"));
        assert_eq!(value["diagnostics"], json!([]));

        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_sheet_filter() {
        let requested = vec!["calc".to_string(), "Missing".to_string()];
        let envelope = envelope(Some(&requested));

        assert_eq!(envelope.data.keys().collect::<Vec<_>>(), vec!["Calc"]);
        let unknown: Vec<&str> = envelope
            .diagnostics
            .of_kind(DiagnosticKind::UnknownSheet)
            .map(|d| d.cell.as_str())
            .collect();
        assert_eq!(unknown, vec!["Missing"]);
    }
}
