//! Engine configuration
//!
//! Everything the engine knows about a particular family of workbooks lives
//! here rather than in code: the sheet processing order, the input alias and
//! unit tables, compatibility overrides and the bespoke output layouts.
//! [`EngineConfig::default()`] carries the built-in tables for the project
//! report workbook; a YAML or JSON file can replace any part of them.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sheetcalc_core::{CellAddress, SheetDefinition, WorkbookModel};
use std::collections::BTreeMap;
use std::path::Path;

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Order in which sheets are processed
    pub sheet_order: SheetOrder,
    /// Rules for mapping caller inputs onto input cells
    pub inputs: InputRules,
    /// Sheets rendered as labeled statements instead of the generic grid
    pub projections: Vec<ProjectionLayout>,
    /// Also record a diagnostic for every read of a formula cell on a sheet
    /// that has not been processed yet, on top of the order check
    pub trace_unresolved: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sheet_order: SheetOrder::default(),
            inputs: InputRules::default(),
            projections: vec![ProjectionLayout::plbs(), ProjectionLayout::finalworkings()],
            trace_unresolved: false,
        }
    }
}

impl EngineConfig {
    /// Parse a YAML configuration; missing fields keep their defaults
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration; missing fields keep their defaults
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file (`.json` as JSON, anything else as YAML)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Find the projection layout for a sheet, if any
    pub fn projection_for(&self, sheet: &str) -> Option<&ProjectionLayout> {
        let wanted = sheetcalc_core::normalize_sheet_name(sheet);
        self.projections
            .iter()
            .find(|p| sheetcalc_core::normalize_sheet_name(&p.sheet) == wanted)
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        for (name, threshold) in [
            ("percent_threshold", self.inputs.percent_threshold),
            ("multiplier_threshold", self.inputs.multiplier_threshold),
        ] {
            if !threshold.is_finite() {
                return Err(Error::Config(format!("{} must be a finite number", name)));
            }
        }

        for (alias, canonical) in &self.inputs.aliases {
            if alias == canonical {
                return Err(Error::Config(format!("input alias '{}' maps to itself", alias)));
            }
        }

        for input_override in &self.inputs.overrides {
            if input_override.targets.is_empty() {
                return Err(Error::Config(format!(
                    "override for input '{}' has no targets",
                    input_override.key
                )));
            }
        }

        for layout in &self.projections {
            if layout.sheet.trim().is_empty() {
                return Err(Error::Config("projection layout without a sheet name".into()));
            }
            if layout.columns.is_empty() {
                return Err(Error::Config(format!(
                    "projection layout for '{}' has no columns",
                    layout.sheet
                )));
            }
            for column in &layout.columns {
                CellAddress::letters_to_column(column).map_err(|e| {
                    Error::Config(format!("projection layout for '{}': {}", layout.sheet, e))
                })?;
            }
        }

        Ok(())
    }
}

/// Fixed order in which sheets are processed
///
/// This is an assumed dependency order, not a computed one: a formula may
/// only read formula results of sheets that come earlier. Sheets the
/// workbook has but the order does not name are processed afterwards, in
/// document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetOrder(Vec<String>);

impl Default for SheetOrder {
    fn default() -> Self {
        Self::new([
            "Assumptions",
            "wp",
            "Depsch",
            "Finalworkings",
            "PLBS",
            "RATIO",
            "MPBF ",
            "nayak",
            "coverpage",
        ])
    }
}

/// A sheet order matched against a workbook
#[derive(Debug)]
pub struct ResolvedOrder<'m> {
    /// Sheets to process, in order
    pub sheets: Vec<&'m SheetDefinition>,
    /// Names in the order that the workbook does not have
    pub unknown: Vec<String>,
}

impl SheetOrder {
    /// Create an order from sheet names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Sheet names as configured
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Match the order against a workbook
    ///
    /// Names match sheets case-insensitively and ignoring surrounding
    /// whitespace. A sheet named twice is processed once, at its first
    /// position.
    pub fn resolve<'m>(&self, model: &'m WorkbookModel) -> ResolvedOrder<'m> {
        let mut sheets: Vec<&'m SheetDefinition> = Vec::with_capacity(model.sheets.len());
        let mut unknown = Vec::new();

        for name in &self.0 {
            match model.sheet(name) {
                Some(sheet) => {
                    if !sheets.iter().any(|s| std::ptr::eq(*s, sheet)) {
                        sheets.push(sheet);
                    }
                }
                None => unknown.push(name.clone()),
            }
        }

        for sheet in &model.sheets {
            if !sheets.iter().any(|s| std::ptr::eq(*s, sheet)) {
                sheets.push(sheet);
            }
        }

        ResolvedOrder { sheets, unknown }
    }
}

impl<S: Into<String>> FromIterator<S> for SheetOrder {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Rules for turning caller inputs into input-cell values
///
/// The unit heuristics are provisional business rules: they guess units
/// from magnitude for specific fields and must not be applied to anything
/// else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputRules {
    /// Legacy input key → canonical input key
    pub aliases: BTreeMap<String, String>,
    /// Fields given as percentages; values above the threshold are divided
    /// by 100 ("12" means 12%)
    pub percent_fields: Vec<String>,
    pub percent_threshold: f64,
    /// Fields given as growth multipliers; values above the threshold are
    /// read as a percentage increase ("12" means 1.12)
    pub multiplier_fields: Vec<String>,
    pub multiplier_threshold: f64,
    /// Extra or corrected cells for specific inputs, applied last
    pub overrides: Vec<InputOverride>,
}

impl Default for InputRules {
    fn default() -> Self {
        let aliases = [
            ("rate_of_interest", "interest_rate"),
            ("loan_amount", "term_loan"),
            ("wc_interest_rate", "working_capital_interest_rate"),
            ("depreciation", "depreciation_rate"),
            ("income_tax_rate", "tax_rate"),
            ("own_contribution", "promoter_contribution"),
        ]
        .into_iter()
        .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
        .collect();

        Self {
            aliases,
            percent_fields: vec![
                "interest_rate".into(),
                "working_capital_interest_rate".into(),
                "depreciation_rate".into(),
                "tax_rate".into(),
            ],
            percent_threshold: 1.0,
            multiplier_fields: vec![
                "sales_growth_factor".into(),
                "expense_escalation_factor".into(),
            ],
            multiplier_threshold: 10.0,
            overrides: vec![
                InputOverride {
                    key: "term_loan".into(),
                    targets: vec![CellTarget::new("Finalworkings", CellAddress::new(12, 7))],
                    replace_declared: false,
                },
                InputOverride {
                    key: "interest_rate".into(),
                    targets: vec![CellTarget::new("Assumptions", CellAddress::new(11, 7))],
                    replace_declared: true,
                },
            ],
        }
    }
}

impl InputRules {
    /// Rules that pass inputs through untouched
    pub fn none() -> Self {
        Self {
            aliases: BTreeMap::new(),
            percent_fields: Vec::new(),
            percent_threshold: 1.0,
            multiplier_fields: Vec::new(),
            multiplier_threshold: 10.0,
            overrides: Vec::new(),
        }
    }
}

/// Cells an input is pinned to in addition to (or instead of) its declared
/// cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputOverride {
    pub key: String,
    pub targets: Vec<CellTarget>,
    /// The declared cell is known to be wrong: undo the generic write there
    #[serde(default)]
    pub replace_declared: bool,
}

/// A sheet-qualified cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellTarget {
    pub sheet: String,
    #[serde(alias = "cell")]
    pub cell_address: CellAddress,
}

impl CellTarget {
    pub fn new<S: Into<String>>(sheet: S, cell_address: CellAddress) -> Self {
        Self {
            sheet: sheet.into(),
            cell_address,
        }
    }
}

/// Labeled view of a statement sheet
///
/// Each line reads one row across the layout's columns; the period header
/// row names the columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionLayout {
    pub sheet: String,
    pub title: String,
    /// Row holding the period labels; columns are labeled by letter without it
    #[serde(default)]
    pub period_row: Option<u32>,
    /// Column letters, one per period
    pub columns: Vec<String>,
    pub sections: Vec<ProjectionSection>,
}

/// A group of lines within a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSection {
    pub key: String,
    pub title: String,
    pub lines: Vec<ProjectionLine>,
    /// Row holding the section total, if the sheet has one
    #[serde(default)]
    pub total_row: Option<u32>,
}

/// One labeled row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionLine {
    pub key: String,
    pub label: String,
    pub row: u32,
}

fn line(key: &str, label: &str, row: u32) -> ProjectionLine {
    ProjectionLine {
        key: key.into(),
        label: label.into(),
        row,
    }
}

fn section(key: &str, title: &str, lines: Vec<ProjectionLine>, total_row: Option<u32>) -> ProjectionSection {
    ProjectionSection {
        key: key.into(),
        title: title.into(),
        lines,
        total_row,
    }
}

impl ProjectionLayout {
    /// Projected income statement and balance sheet, five yearly columns
    pub fn plbs() -> Self {
        Self {
            sheet: "PLBS".into(),
            title: "Projected Income Statement and Balance Sheet".into(),
            period_row: Some(4),
            columns: ["D", "E", "F", "G", "H"].map(String::from).to_vec(),
            sections: vec![
                section(
                    "income_statement",
                    "Income Statement",
                    vec![
                        line("revenue", "Sales / Revenue", 6),
                        line("cost_of_sales", "Cost of Sales", 7),
                        line("gross_profit", "Gross Profit", 8),
                        line("operating_expenses", "Operating Expenses", 9),
                        line("depreciation", "Depreciation", 10),
                        line("interest", "Interest", 11),
                        line("profit_before_tax", "Profit Before Tax", 12),
                        line("tax", "Income Tax", 13),
                    ],
                    Some(14),
                ),
                section(
                    "liabilities",
                    "Liabilities",
                    vec![
                        line("capital", "Capital", 18),
                        line("reserves", "Reserves and Surplus", 19),
                        line("term_loan", "Term Loan", 20),
                        line("working_capital_loan", "Working Capital Loan", 21),
                        line("current_liabilities", "Current Liabilities", 22),
                    ],
                    Some(23),
                ),
                section(
                    "assets",
                    "Assets",
                    vec![
                        line("gross_block", "Fixed Assets (Gross Block)", 26),
                        line("accumulated_depreciation", "Less: Depreciation", 27),
                        line("net_block", "Net Block", 28),
                        line("current_assets", "Current Assets", 29),
                        line("cash", "Cash and Bank", 30),
                    ],
                    Some(31),
                ),
            ],
        }
    }

    /// Cost of project and means of finance, one amount column
    pub fn finalworkings() -> Self {
        Self {
            sheet: "Finalworkings".into(),
            title: "Cost of Project and Means of Finance".into(),
            period_row: None,
            columns: vec!["H".into()],
            sections: vec![
                section(
                    "project_cost",
                    "Cost of Project",
                    vec![
                        line("land_building", "Land and Building", 5),
                        line("plant_machinery", "Plant and Machinery", 6),
                        line("furniture", "Furniture and Fixtures", 7),
                        line("preliminary_expenses", "Preliminary Expenses", 8),
                        line("working_capital_margin", "Working Capital Margin", 9),
                    ],
                    Some(10),
                ),
                section(
                    "means_of_finance",
                    "Means of Finance",
                    vec![
                        line("promoter_contribution", "Promoter Contribution", 12),
                        line("term_loan", "Term Loan", 13),
                        line("subsidy", "Subsidy", 14),
                    ],
                    Some(15),
                ),
            ],
        }
    }
}
