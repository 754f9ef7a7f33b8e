//! Structured record of everything that degraded to zero during a run

use serde::Serialize;
use sheetcalc_formula::FormulaError;
use std::collections::BTreeMap;
use std::fmt;

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Parse,
    UnknownFunction,
    ArgumentCount,
    TypeMismatch,
    DivisionByZero,
    NonFinite,
    CircularReference,
    UnknownSheet,
    UnsupportedRange,
    InvalidReference,
    /// A formula read a formula cell of a sheet that had not been processed
    ForwardSheetReference,
    /// A caller-supplied input could not be applied
    InvalidInput,
}

impl DiagnosticKind {
    /// Snake-case name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Parse => "parse",
            DiagnosticKind::UnknownFunction => "unknown_function",
            DiagnosticKind::ArgumentCount => "argument_count",
            DiagnosticKind::TypeMismatch => "type_mismatch",
            DiagnosticKind::DivisionByZero => "division_by_zero",
            DiagnosticKind::NonFinite => "non_finite",
            DiagnosticKind::CircularReference => "circular_reference",
            DiagnosticKind::UnknownSheet => "unknown_sheet",
            DiagnosticKind::UnsupportedRange => "unsupported_range",
            DiagnosticKind::InvalidReference => "invalid_reference",
            DiagnosticKind::ForwardSheetReference => "forward_sheet_reference",
            DiagnosticKind::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&FormulaError> for DiagnosticKind {
    fn from(error: &FormulaError) -> Self {
        match error {
            FormulaError::Parse(_) => DiagnosticKind::Parse,
            FormulaError::UnknownFunction(_) => DiagnosticKind::UnknownFunction,
            FormulaError::ArgumentCount { .. } => DiagnosticKind::ArgumentCount,
            FormulaError::TypeMismatch(_) => DiagnosticKind::TypeMismatch,
            FormulaError::DivisionByZero => DiagnosticKind::DivisionByZero,
            FormulaError::NonFinite(_) => DiagnosticKind::NonFinite,
            FormulaError::CircularReference(_) => DiagnosticKind::CircularReference,
            FormulaError::UnknownSheet(_) => DiagnosticKind::UnknownSheet,
            FormulaError::UnsupportedRange(_) => DiagnosticKind::UnsupportedRange,
            FormulaError::InvalidReference(_) | FormulaError::Deferred(_) => {
                DiagnosticKind::InvalidReference
            }
        }
    }
}

/// One degrade-to-zero event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Cell key (`Sheet!A1`), or the sheet or input name when the problem
    /// is not tied to one cell
    pub cell: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.cell, self.kind, self.message)
    }
}

/// Ordered collection of diagnostics for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and log it
    pub fn push<C: Into<String>, M: Into<String>>(
        &mut self,
        cell: C,
        kind: DiagnosticKind,
        message: M,
    ) {
        let diagnostic = Diagnostic {
            cell: cell.into(),
            kind,
            message: message.into(),
        };

        match kind {
            DiagnosticKind::ForwardSheetReference => log::debug!("{}", diagnostic),
            _ => log::warn!("{}", diagnostic),
        }

        self.entries.push(diagnostic);
    }

    /// Record a formula failure for a cell
    pub fn push_formula_error<C: Into<String>>(&mut self, cell: C, error: &FormulaError) {
        self.push(cell, error.into(), error.to_string());
    }

    /// Append every diagnostic of another collection
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Diagnostics of one kind
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    /// Diagnostics recorded for one cell key
    pub fn for_cell<'a>(&'a self, cell: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.entries.iter().filter(move |d| d.cell == cell)
    }

    /// Number of diagnostics per kind
    pub fn counts(&self) -> BTreeMap<DiagnosticKind, usize> {
        let mut counts = BTreeMap::new();
        for diagnostic in &self.entries {
            *counts.entry(diagnostic.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
