//! Workbook calculation engine
//!
//! Runs one calculation over a loaded [`WorkbookModel`]:
//!
//! 1. Write every sheet's static values into a fresh [`CellStore`]
//! 2. Apply caller inputs ([`crate::inputs`])
//! 3. Check the sheet order and report forward references
//! 4. Evaluate each sheet's formulas in declared order, sheets in
//!    [`SheetOrder`]
//!
//! Formulas on the sheet being processed that another formula reads before
//! their turn are evaluated on demand, through a [`TraversalGuard`], which is
//! how cycles are found. Formula cells on sheets that come later are read as
//! whatever the store holds, usually 0.
//!
//! # Example
//!
//! ```rust
//! use sheetcalc::prelude::*;
//!
//! let model = parse_workbook(
//!     r#"
//! sheets:
//!   Assumptions:
//!     formulas:
//!       - { cell_address: C5, formula_text: "=C3*C4" }
//!     static_values:
//!       - { cell_address: C3, value: 100 }
//!       - { cell_address: C4, value: 3 }
//! "#,
//!     WorkbookFormat::Yaml,
//! )
//! .unwrap();
//!
//! let engine = Engine::default();
//! let output = engine.calculate(&model, &Default::default());
//! assert_eq!(output.value("Assumptions", "C5").unwrap(), CellValue::Number(300.0));
//! ```

use crate::config::{EngineConfig, SheetOrder};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::inputs::{normalize_inputs, InputReport};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use serde_json::{Map, Value};
use sheetcalc_core::{
    normalize_sheet_name, CellAddress, CellKey, CellRange, CellStore, CellValue, FormulaCellDef,
    SheetDefinition, WorkbookModel,
};
use std::collections::BTreeSet;
use sheetcalc_formula::{
    evaluate, extract_references, parse_formula, CellResolver, EvaluationContext, FormulaError,
    FormulaExpr, FormulaResult, FormulaValue, TraversalGuard,
};

/// Statistics from a calculation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CalculationStats {
    /// Sheets in the workbook
    pub total_sheets: usize,
    /// Formula cells in the workbook
    pub total_formulas: usize,
    /// Formulas that produced a value
    pub total_calculated: usize,
    /// Formulas that degraded to 0
    pub total_failed: usize,
    /// Formulas that were part of a circular chain
    pub circular_references: usize,
    /// Sheets in the order they were processed
    pub sheets_processed: Vec<String>,
}

/// Everything one calculation produced
#[derive(Debug)]
pub struct CalculationOutput {
    pub store: CellStore,
    pub diagnostics: Diagnostics,
    pub stats: CalculationStats,
    pub inputs: InputReport,
}

impl CalculationOutput {
    /// Computed or supplied value of a cell (A1 or R1C1 address)
    pub fn value(&self, sheet: &str, cell: &str) -> sheetcalc_core::Result<CellValue> {
        Ok(self.store.get(sheet, CellAddress::parse_any(cell)?))
    }
}

/// The calculation engine
///
/// Holds only configuration; every run owns its own store, so one engine can
/// serve concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check the configured sheet order against a workbook
    pub fn validate(&self, model: &WorkbookModel) -> Diagnostics {
        validate_sheet_order(model, &self.config.sheet_order)
    }

    /// Calculate every formula of the workbook
    ///
    /// Never fails: anything that goes wrong degrades the affected cell to 0
    /// and is reported in [`CalculationOutput::diagnostics`].
    pub fn calculate(&self, model: &WorkbookModel, inputs: &Map<String, Value>) -> CalculationOutput {
        let mut store = CellStore::with_sheets(model.sheet_names());
        let mut diagnostics = Diagnostics::new();

        // Phase 1: static values
        for sheet in &model.sheets {
            for cell in &sheet.static_values {
                if let Err(e) = store.set(&sheet.name, cell.cell_address, cell.value.clone()) {
                    log::warn!("static value {}!{} not stored: {}", sheet.name, cell.cell_address, e);
                }
            }
        }

        // Phase 2: inputs
        let input_report = normalize_inputs(model, inputs, &self.config.inputs, &mut store, &mut diagnostics);

        // Phase 3: sheet order
        let resolved = self.config.sheet_order.resolve(model);
        for name in &resolved.unknown {
            log::warn!("sheet '{}' in the sheet order is not in the workbook", name);
            diagnostics.push(
                name.as_str(),
                DiagnosticKind::UnknownSheet,
                "listed in the sheet order but not in the workbook",
            );
        }
        diagnostics.extend(check_forward_references(&resolved.sheets));

        // Phase 4: parse every formula once
        let parsed: Vec<(String, Vec<ParsedFormula<'_>>)> = resolved
            .sheets
            .iter()
            .map(|sheet| {
                let formulas = sheet
                    .formulas
                    .iter()
                    .map(|def| ParsedFormula {
                        def,
                        ast: parse_formula(&def.formula_text),
                    })
                    .collect();
                (sheet.name.clone(), formulas)
            })
            .collect();

        let formula_cells: AHashMap<String, AHashSet<CellAddress>> = parsed
            .iter()
            .map(|(sheet, formulas)| {
                let cells = formulas.iter().map(|f| f.def.cell_address).collect();
                (sheet.clone(), cells)
            })
            .collect();

        let mut stats = CalculationStats {
            total_sheets: model.sheets.len(),
            total_formulas: model.formula_count(),
            ..Default::default()
        };

        // Phase 5: evaluate, sheet by sheet
        let mut run = RunResolver {
            store,
            diagnostics,
            guard: TraversalGuard::new(),
            formula_cells,
            processed: AHashSet::new(),
            sheet: String::new(),
            pending: AHashMap::new(),
            deferred: Vec::new(),
            traced: Vec::new(),
            cycle_origin: None,
            trace_unresolved: self.config.trace_unresolved,
            stats: &mut stats,
        };

        for (sheet, formulas) in &parsed {
            log::debug!("calculating sheet '{}' ({} formulas)", sheet, formulas.len());
            run.sheet = sheet.clone();
            run.pending = formulas.iter().map(|f| (f.def.cell_address, f)).collect();

            for formula in formulas {
                if run.pending.contains_key(&formula.def.cell_address) {
                    run.evaluate_cell(formula.def.cell_address);
                }
            }

            run.pending.clear();
            run.processed.insert(sheet.clone());
            run.stats.sheets_processed.push(sheet.clone());
        }

        let RunResolver {
            store, diagnostics, ..
        } = run;

        log::info!(
            "calculated {} of {} formulas across {} sheets ({} failed, {} diagnostics)",
            stats.total_calculated,
            stats.total_formulas,
            stats.sheets_processed.len(),
            stats.total_failed,
            diagnostics.len()
        );

        CalculationOutput {
            store,
            diagnostics,
            stats,
            inputs: input_report,
        }
    }
}

/// Report every formula that reads a formula cell of a sheet processed after
/// its own
///
/// Such reads see the store before the other sheet has been calculated,
/// usually 0. One diagnostic per formula and offending sheet. References to
/// unknown sheets are left to evaluation, which reports them.
pub fn validate_sheet_order(model: &WorkbookModel, order: &SheetOrder) -> Diagnostics {
    let resolved = order.resolve(model);
    let mut diagnostics = Diagnostics::new();
    for name in &resolved.unknown {
        diagnostics.push(
            name.as_str(),
            DiagnosticKind::UnknownSheet,
            "listed in the sheet order but not in the workbook",
        );
    }
    diagnostics.extend(check_forward_references(&resolved.sheets));
    diagnostics
}

fn check_forward_references(sheets: &[&SheetDefinition]) -> Diagnostics {
    let position: AHashMap<String, usize> = sheets
        .iter()
        .enumerate()
        .map(|(i, sheet)| (normalize_sheet_name(&sheet.name), i))
        .collect();
    let columns: Vec<FormulaColumns> = sheets.iter().map(|sheet| FormulaColumns::new(sheet)).collect();

    let mut diagnostics = Diagnostics::new();

    for (index, sheet) in sheets.iter().enumerate() {
        for def in &sheet.formulas {
            let Ok(ast) = parse_formula(&def.formula_text) else {
                continue;
            };

            // sheet index → first offending cell and count
            let mut offending: Vec<(usize, CellAddress, usize)> = Vec::new();
            for precedent in extract_references(&ast) {
                let Some(target_name) = precedent.sheet else { continue };
                let Some(&target) = position.get(&normalize_sheet_name(&target_name)) else {
                    continue;
                };
                // multi-column ranges fail at evaluation
                if target <= index || !precedent.range.is_single_column() {
                    continue;
                }
                let Some((first, count)) = columns[target].within(&precedent.range) else {
                    continue;
                };

                match offending.iter_mut().find(|(t, _, _)| *t == target) {
                    Some((_, _, total)) => *total += count,
                    None => offending.push((target, first, count)),
                }
            }

            for (target, first, count) in offending {
                let target = &sheets[target].name;
                let message = if count == 1 {
                    format!("reads formula cell {}!{} before '{}' is calculated", target, first, target)
                } else {
                    format!(
                        "reads {} formula cells of '{}' (first {}!{}) before it is calculated",
                        count, target, target, first
                    )
                };
                diagnostics.push(
                    CellKey::new(sheet.name.as_str(), def.cell_address).to_string(),
                    DiagnosticKind::ForwardSheetReference,
                    message,
                );
            }
        }
    }

    diagnostics
}

/// Formula rows of one sheet, per column
struct FormulaColumns(AHashMap<u16, BTreeSet<u32>>);

impl FormulaColumns {
    fn new(sheet: &SheetDefinition) -> Self {
        let mut columns: AHashMap<u16, BTreeSet<u32>> = AHashMap::new();
        for def in &sheet.formulas {
            columns
                .entry(def.cell_address.col)
                .or_default()
                .insert(def.cell_address.row);
        }
        Self(columns)
    }

    /// First formula cell of a single-column range, and how many it holds
    fn within(&self, range: &CellRange) -> Option<(CellAddress, usize)> {
        let rows = self.0.get(&range.start.col)?;
        let mut hits = rows.range(range.start.row..=range.end.row);
        let first = *hits.next()?;
        Some((CellAddress::new(first, range.start.col), 1 + hits.count()))
    }
}

/// A formula cell with its parse result
struct ParsedFormula<'m> {
    def: &'m FormulaCellDef,
    ast: FormulaResult<FormulaExpr>,
}

/// Outcome of one try at a formula
enum Attempt {
    Done(FormulaResult<CellValue>),
    /// Cells of the current sheet to compute before trying again
    Deferred(Vec<CellAddress>),
}

/// Mutable state of one run; resolves references for the evaluator
struct RunResolver<'p, 'm> {
    store: CellStore,
    diagnostics: Diagnostics,
    guard: TraversalGuard,
    /// Formula cells of every sheet, by canonical sheet name
    formula_cells: AHashMap<String, AHashSet<CellAddress>>,
    /// Sheets whose formulas have all been evaluated
    processed: AHashSet<String>,
    /// Sheet being calculated
    sheet: String,
    /// Formulas of the current sheet not evaluated yet
    pending: AHashMap<CellAddress, &'p ParsedFormula<'m>>,
    /// Pending cells the formula being tried asked for
    deferred: Vec<CellAddress>,
    /// Forward reads of the formula being tried, recorded once it finishes
    traced: Vec<String>,
    /// Cell whose re-entry closed the cycle being unwound
    cycle_origin: Option<CellKey>,
    trace_unresolved: bool,
    stats: &'p mut CalculationStats,
}

impl<'p, 'm> RunResolver<'p, 'm> {
    /// Evaluate a pending formula of the current sheet, along with every
    /// pending formula it reads
    ///
    /// Runs off an explicit work stack rather than recursion: a formula that
    /// reads a pending cell is abandoned, the cell is pushed, and the formula
    /// is tried again from the start once the cell has a value. A cell stays
    /// in the guard from its first try until it is stored.
    fn evaluate_cell(&mut self, address: CellAddress) {
        let mut stack = vec![address];
        // Circular failure that still has to fail the cells below it
        let mut unwinding: Option<FormulaError> = None;

        while let Some(&address) = stack.last() {
            let Some(formula) = self.pending.get(&address).copied() else {
                stack.pop();
                continue;
            };
            let key = CellKey::new(self.sheet.as_str(), address);

            let result = match unwinding.take() {
                Some(error) if self.guard.contains(&key) => Err(error),
                Some(error) => {
                    // queued but never tried; it gets its own turn later
                    unwinding = Some(error);
                    stack.pop();
                    continue;
                }
                None => {
                    // retries are in flight from their first try already
                    if !self.guard.contains(&key) {
                        self.guard.enter(&key).ok();
                    }
                    match self.attempt(&key, formula) {
                        Attempt::Deferred(cells) => {
                            stack.extend(cells.into_iter().rev());
                            continue;
                        }
                        Attempt::Done(result) => result,
                    }
                }
            };

            stack.pop();
            unwinding = self.finish(&key, formula, result);
        }
    }

    /// Try a formula once
    fn attempt(&mut self, key: &CellKey, formula: &ParsedFormula<'_>) -> Attempt {
        let ast = match &formula.ast {
            Ok(ast) => ast,
            Err(e) => return Attempt::Done(Err(e.clone())),
        };

        self.deferred.clear();
        self.traced.clear();
        let sheet = key.sheet.clone();
        let mut ctx = EvaluationContext::new(self, &sheet);
        let result = evaluate(ast, &mut ctx).and_then(FormulaValue::into_cell_value);

        match result {
            Err(FormulaError::Deferred(_)) if !self.deferred.is_empty() => {
                Attempt::Deferred(std::mem::take(&mut self.deferred))
            }
            result => {
                for message in std::mem::take(&mut self.traced) {
                    self.diagnostics
                        .push(key.to_string(), DiagnosticKind::ForwardSheetReference, message);
                }
                Attempt::Done(result)
            }
        }
    }

    /// Store the outcome of a formula
    ///
    /// Returns the circular failure when `key` is inside a cycle that closes
    /// further down: every cell of the chain fails, up to the cell whose
    /// re-entry was detected.
    fn finish(
        &mut self,
        key: &CellKey,
        formula: &ParsedFormula<'_>,
        result: FormulaResult<CellValue>,
    ) -> Option<FormulaError> {
        self.guard.leave(key);
        self.pending.remove(&key.address);

        match result {
            Ok(value) => {
                log::trace!("{} = {}", key, value);
                self.write(key, value);
                self.stats.total_calculated += 1;
                None
            }
            Err(error) => {
                log::debug!("{} ({}) failed: {}", key, formula.def.formula_text, error);
                self.write(key, CellValue::zero());
                self.stats.total_failed += 1;
                self.diagnostics.push_formula_error(key.to_string(), &error);

                if let FormulaError::CircularReference(_) = error {
                    self.stats.circular_references += 1;
                    let closes_cycle = self
                        .cycle_origin
                        .as_ref()
                        .map_or(true, |origin| origin == key);
                    if !closes_cycle {
                        return Some(error);
                    }
                    self.cycle_origin = None;
                }
                None
            }
        }
    }

    fn write(&mut self, key: &CellKey, value: CellValue) {
        if let Err(e) = self.store.set(&key.sheet, key.address, value) {
            log::warn!("result for {} not stored: {}", key, e);
        }
    }

    fn canonical_sheet(&self, sheet: &str) -> FormulaResult<String> {
        self.store
            .resolve_sheet(sheet)
            .map(str::to_string)
            .ok_or_else(|| FormulaError::UnknownSheet(sheet.to_string()))
    }

    /// Read one cell of a canonical sheet
    fn read(&mut self, sheet: &str, address: CellAddress) -> FormulaResult<CellValue> {
        if sheet == self.sheet && self.pending.contains_key(&address) {
            let key = CellKey::new(sheet, address);
            if let Err(e) = self.guard.check(&key) {
                log::warn!("circular reference at {}: {}", key, e);
                self.cycle_origin.get_or_insert(key);
                return Err(e);
            }
            self.deferred.push(address);
            return Err(FormulaError::Deferred(key.to_string()));
        }

        if self.trace_unresolved && self.is_unresolved(sheet, address) {
            self.traced
                .push(format!("read {}!{} before its sheet was calculated", sheet, address));
        }

        Ok(self.store.get(sheet, address))
    }

    /// Formula cell of a sheet that has not been calculated yet
    fn is_unresolved(&self, sheet: &str, address: CellAddress) -> bool {
        sheet != self.sheet
            && !self.processed.contains(sheet)
            && self
                .formula_cells
                .get(sheet)
                .map_or(false, |cells| cells.contains(&address))
    }
}

impl CellResolver for RunResolver<'_, '_> {
    fn resolve_cell(&mut self, sheet: &str, address: CellAddress) -> FormulaResult<CellValue> {
        let canonical = self.canonical_sheet(sheet)?;
        self.read(&canonical, address)
    }

    /// Pending members of the current sheet are deferred all at once, in row
    /// order, up to the first member in flight, which reads as a cycle.
    /// Values come from the written cells only, so a whole column costs what
    /// the sheet holds.
    fn range_numbers(&mut self, sheet: &str, range: &CellRange) -> FormulaResult<Vec<f64>> {
        let canonical = self.canonical_sheet(sheet)?;

        if canonical == self.sheet {
            let mut members: Vec<CellAddress> = self
                .pending
                .keys()
                .filter(|address| range.contains(address))
                .copied()
                .collect();
            members.sort_unstable();

            if let Some(&first) = members.first() {
                let in_flight = |address: &CellAddress| {
                    self.guard.contains(&CellKey::new(canonical.as_str(), *address))
                };
                let needed: Vec<CellAddress> =
                    members.iter().copied().take_while(|a| !in_flight(a)).collect();
                if needed.is_empty() {
                    // the first pending member is in flight
                    return self.read(&canonical, first).map(|_| Vec::new());
                }
                self.deferred.extend(needed);
                return Err(FormulaError::Deferred(format!("{}!{}", canonical, range)));
            }
        }

        if self.trace_unresolved && canonical != self.sheet && !self.processed.contains(&canonical) {
            let mut unresolved: Vec<CellAddress> = self
                .formula_cells
                .get(&canonical)
                .map(|cells| cells.iter().filter(|a| range.contains(a)).copied().collect())
                .unwrap_or_default();
            unresolved.sort_unstable();
            for address in unresolved {
                self.traced
                    .push(format!("read {}!{} before its sheet was calculated", canonical, address));
            }
        }

        // absent cells read as 0
        let mut numbers = Vec::with_capacity(range.row_count() as usize);
        let mut next_row = range.start.row;
        for (address, value) in self.store.range_cells(&canonical, range) {
            numbers.resize(numbers.len() + address.row.saturating_sub(next_row) as usize, 0.0);
            if let CellValue::Number(n) = value {
                numbers.push(*n);
            }
            next_row = address.row + 1;
        }
        numbers.resize(numbers.len() + (range.end.row + 1 - next_row) as usize, 0.0);
        Ok(numbers)
    }
}
