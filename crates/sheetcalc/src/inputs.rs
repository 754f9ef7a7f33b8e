//! Input normalizer: maps caller-supplied named inputs onto input cells
//!
//! Steps, in order:
//!
//! 1. Convert caller values (numbers, numeric strings, text, booleans)
//! 2. Resolve legacy aliases to canonical keys; a canonical key supplied
//!    alongside its alias wins
//! 3. Rescale percentage and multiplier fields by magnitude
//! 4. Write every catalogue input (supplied value, else its default)
//! 5. Apply compatibility overrides
//! 6. Apply direct cell updates (`"updates": [{sheet, cell, value}]`)
//!
//! Nothing here fails the run: unusable inputs are skipped and reported as
//! [`DiagnosticKind::InvalidInput`].

use crate::config::InputRules;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use serde::Serialize;
use serde_json::{Map, Value};
use sheetcalc_core::{CellAddress, CellKey, CellStore, CellValue, WorkbookModel};
use std::collections::BTreeMap;

/// Caller key holding direct cell writes rather than a named input
pub const UPDATES_KEY: &str = "updates";

/// What the normalizer did with the caller's inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputReport {
    /// Catalogue inputs written from a caller-supplied value
    pub applied: Vec<String>,
    /// Catalogue inputs written from their declared default
    pub defaults_used: Vec<String>,
    /// Alias → canonical key, for aliases the caller used
    pub aliases_resolved: BTreeMap<String, String>,
    /// Fields whose value was rescaled
    pub rescaled: Vec<RescaledInput>,
    /// Override targets written, as `Sheet!A1`
    pub overrides_applied: Vec<String>,
    /// Direct cell updates written, as `Sheet!A1`
    pub updates_applied: Vec<String>,
    /// Caller keys that matched no catalogue input or override
    pub ignored: Vec<String>,
}

/// A field the unit heuristics changed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RescaledInput {
    pub key: String,
    pub original: f64,
    pub value: f64,
}

/// Convert one caller value
///
/// `null` is absent. Arrays and objects have no cell representation.
pub fn convert_input_value(value: &Value) -> std::result::Result<Option<CellValue>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(CellValue::from(*b))),
        Value::Number(n) => n
            .as_f64()
            .map(|n| Some(CellValue::number(n)))
            .ok_or_else(|| format!("number {} is out of range", n)),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Some(CellValue::Number(n))),
            _ => Ok(Some(CellValue::string(s.as_str()))),
        },
        Value::Array(_) => Err("arrays cannot be written to a cell".into()),
        Value::Object(_) => Err("objects cannot be written to a cell".into()),
    }
}

/// Apply caller inputs to the store
///
/// Static values must already be in the store: input cells that carry a
/// placeholder literal are overwritten here.
pub fn normalize_inputs(
    model: &WorkbookModel,
    inputs: &Map<String, Value>,
    rules: &InputRules,
    store: &mut CellStore,
    diagnostics: &mut Diagnostics,
) -> InputReport {
    let mut report = InputReport::default();

    // Phase 1: convert
    let mut supplied: BTreeMap<String, CellValue> = BTreeMap::new();
    for (key, value) in inputs {
        if key == UPDATES_KEY && value.is_array() {
            continue;
        }
        match convert_input_value(value) {
            Ok(Some(converted)) => {
                supplied.insert(key.clone(), converted);
            }
            Ok(None) => {}
            Err(message) => diagnostics.push(key.as_str(), DiagnosticKind::InvalidInput, message),
        }
    }

    // Phase 2: aliases
    for (alias, canonical) in &rules.aliases {
        if let Some(value) = supplied.remove(alias) {
            if !supplied.contains_key(canonical) {
                supplied.insert(canonical.clone(), value);
            } else {
                log::debug!(
                    "input '{}' ignored, canonical '{}' was also supplied",
                    alias,
                    canonical
                );
            }
            report.aliases_resolved.insert(alias.clone(), canonical.clone());
        }
    }

    // Phase 3: unit heuristics
    rescale(&mut supplied, &rules.percent_fields, rules.percent_threshold, &mut report, |v| {
        v / 100.0
    });
    rescale(
        &mut supplied,
        &rules.multiplier_fields,
        rules.multiplier_threshold,
        &mut report,
        |v| 1.0 + v / 100.0,
    );

    // Phase 4: generic mapping
    let mut declared_before: BTreeMap<&str, (CellKey, Option<CellValue>)> = BTreeMap::new();
    for input in &model.inputs {
        let (value, from_caller) = match supplied.get(&input.key) {
            Some(value) => (value.clone(), true),
            None => match &input.default_value {
                Some(default) => (default.clone(), false),
                None => continue,
            },
        };

        let previous = store.get_opt(&input.sheet, input.cell_address).cloned();
        if let Err(e) = store.set(&input.sheet, input.cell_address, value) {
            diagnostics.push(input.key.as_str(), DiagnosticKind::InvalidInput, e.to_string());
            continue;
        }
        declared_before.insert(
            input.key.as_str(),
            (CellKey::new(input.sheet.as_str(), input.cell_address), previous),
        );

        if from_caller {
            report.applied.push(input.key.clone());
        } else {
            report.defaults_used.push(input.key.clone());
        }
    }

    // Phase 5: compatibility overrides
    for input_override in &rules.overrides {
        let value = supplied.get(&input_override.key).cloned().or_else(|| {
            model
                .input(&input_override.key)
                .and_then(|input| input.default_value.clone())
        });
        let Some(value) = value else { continue };

        if input_override.replace_declared {
            if let Some((declared, previous)) = declared_before.get(input_override.key.as_str()) {
                let retargeted = input_override.targets.iter().all(|t| {
                    store.resolve_sheet(&t.sheet) != store.resolve_sheet(&declared.sheet)
                        || t.cell_address != declared.address
                });
                if retargeted {
                    let restored = previous.clone().unwrap_or_else(CellValue::zero);
                    // The declared sheet was writable a moment ago
                    let _ = store.set(&declared.sheet, declared.address, restored);
                }
            }
        }

        for target in &input_override.targets {
            match store.set(&target.sheet, target.cell_address, value.clone()) {
                Ok(()) => report
                    .overrides_applied
                    .push(format!("{}!{}", target.sheet, target.cell_address)),
                Err(e) => diagnostics.push(
                    input_override.key.as_str(),
                    DiagnosticKind::InvalidInput,
                    format!("override target {}!{}: {}", target.sheet, target.cell_address, e),
                ),
            }
        }
    }

    // Phase 6: direct cell updates
    if let Some(Value::Array(updates)) = inputs.get(UPDATES_KEY) {
        for (index, update) in updates.iter().enumerate() {
            match apply_update(update, store) {
                Ok(Some(target)) => report.updates_applied.push(target),
                Ok(None) => {}
                Err(message) => diagnostics.push(
                    format!("{}[{}]", UPDATES_KEY, index),
                    DiagnosticKind::InvalidInput,
                    message,
                ),
            }
        }
    }

    for key in supplied.keys() {
        let known = model.input(key).is_some()
            || rules.overrides.iter().any(|o| &o.key == key);
        if !known {
            log::debug!("input '{}' matches no input cell", key);
            report.ignored.push(key.clone());
        }
    }

    log::debug!(
        "inputs: {} supplied, {} defaults, {} overrides, {} updates",
        report.applied.len(),
        report.defaults_used.len(),
        report.overrides_applied.len(),
        report.updates_applied.len()
    );

    report
}

fn rescale<F>(
    supplied: &mut BTreeMap<String, CellValue>,
    fields: &[String],
    threshold: f64,
    report: &mut InputReport,
    convert: F,
) where
    F: Fn(f64) -> f64,
{
    for field in fields {
        if let Some(CellValue::Number(original)) = supplied.get(field).cloned() {
            if original > threshold {
                let value = convert(original);
                log::debug!("input '{}' rescaled from {} to {}", field, original, value);
                supplied.insert(field.clone(), CellValue::Number(value));
                report.rescaled.push(RescaledInput {
                    key: field.clone(),
                    original,
                    value,
                });
            }
        }
    }
}

/// Write one `{sheet, cell, value}` update; `Ok(None)` for a null value
fn apply_update(update: &Value, store: &mut CellStore) -> std::result::Result<Option<String>, String> {
    let Value::Object(fields) = update else {
        return Err("update must be an object with sheet, cell and value".into());
    };

    let sheet = fields
        .get("sheet")
        .and_then(Value::as_str)
        .ok_or("update is missing 'sheet'")?;
    let cell = fields
        .get("cell")
        .or_else(|| fields.get("cell_address"))
        .and_then(Value::as_str)
        .ok_or("update is missing 'cell'")?;
    let address = CellAddress::parse_any(cell).map_err(|e| e.to_string())?;

    let Some(value) = convert_input_value(fields.get("value").unwrap_or(&Value::Null))? else {
        return Ok(None);
    };

    store
        .set(sheet, address, value)
        .map_err(|e| e.to_string())?;
    Ok(Some(format!("{}!{}", sheet, address)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CellTarget, InputOverride};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sheetcalc_core::{InputDefinition, SheetDefinition};

    fn addr(s: &str) -> CellAddress {
        CellAddress::parse_any(s).unwrap()
    }

    fn input(key: &str, sheet: &str, cell: &str, default: Option<f64>) -> InputDefinition {
        InputDefinition {
            key: key.into(),
            sheet: sheet.into(),
            cell_address: addr(cell),
            default_value: default.map(CellValue::Number),
            description: None,
        }
    }

    fn model(inputs: Vec<InputDefinition>) -> WorkbookModel {
        WorkbookModel {
            inputs,
            sheets: vec![SheetDefinition::new("Assumptions"), SheetDefinition::new("Finalworkings")],
            ..Default::default()
        }
    }

    fn run(
        model: &WorkbookModel,
        inputs: Value,
        rules: &InputRules,
    ) -> (CellStore, Diagnostics, InputReport) {
        let mut store = CellStore::with_sheets(model.sheet_names());
        let mut diagnostics = Diagnostics::new();
        let Value::Object(inputs) = inputs else { panic!("inputs must be an object") };
        let report = normalize_inputs(model, &inputs, rules, &mut store, &mut diagnostics);
        (store, diagnostics, report)
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(convert_input_value(&json!(5)).unwrap(), Some(CellValue::Number(5.0)));
        assert_eq!(convert_input_value(&json!(" 7.5 ")).unwrap(), Some(CellValue::Number(7.5)));
        assert_eq!(convert_input_value(&json!("Acme")).unwrap(), Some(CellValue::string("Acme")));
        assert_eq!(convert_input_value(&json!(true)).unwrap(), Some(CellValue::Number(1.0)));
        assert_eq!(convert_input_value(&json!(null)).unwrap(), None);
        assert!(convert_input_value(&json!([1, 2])).is_err());
        assert!(convert_input_value(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_defaults_fill_missing_inputs() {
        let model = model(vec![input("tax_rate", "Assumptions", "C9", Some(12.0))]);
        let (store, diagnostics, report) = run(&model, json!({}), &InputRules::none());

        assert_eq!(store.get("Assumptions", addr("C9")), CellValue::Number(12.0));
        assert_eq!(report.defaults_used, vec!["tax_rate"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_alias_writes_canonical_cell() {
        let model = model(vec![
            input("interest_rate", "Assumptions", "H12", None),
            input("rate_of_interest", "Assumptions", "H20", None),
        ]);
        let mut rules = InputRules::none();
        rules.aliases.insert("rate_of_interest".into(), "interest_rate".into());

        let (store, _, report) = run(&model, json!({ "rate_of_interest": 0.09 }), &rules);

        assert_eq!(store.get("Assumptions", addr("H12")), CellValue::Number(0.09));
        assert!(store.get_opt("Assumptions", addr("H20")).is_none());
        assert_eq!(
            report.aliases_resolved.get("rate_of_interest").map(String::as_str),
            Some("interest_rate")
        );
    }

    #[test]
    fn test_canonical_key_beats_alias() {
        let model = model(vec![input("interest_rate", "Assumptions", "H12", None)]);
        let mut rules = InputRules::none();
        rules.aliases.insert("rate_of_interest".into(), "interest_rate".into());

        let (store, _, _) = run(
            &model,
            json!({ "rate_of_interest": 0.05, "interest_rate": 0.08 }),
            &rules,
        );
        assert_eq!(store.get("Assumptions", addr("H12")), CellValue::Number(0.08));
    }

    #[test]
    fn test_percent_and_multiplier_heuristics() {
        let model = model(vec![
            input("interest_rate", "Assumptions", "C1", None),
            input("tax_rate", "Assumptions", "C2", None),
            input("sales_growth_factor", "Assumptions", "C3", None),
            input("expense_escalation_factor", "Assumptions", "C4", None),
        ]);
        let mut rules = InputRules::default();
        rules.overrides.clear();

        let (store, _, report) = run(
            &model,
            json!({
                "interest_rate": 12,
                "tax_rate": 0.3,
                "sales_growth_factor": "12",
                "expense_escalation_factor": 1.05,
            }),
            &rules,
        );

        assert_eq!(store.get("Assumptions", addr("C1")), CellValue::Number(0.12));
        assert_eq!(store.get("Assumptions", addr("C2")), CellValue::Number(0.3));
        assert_eq!(store.get("Assumptions", addr("C3")), CellValue::Number(1.12));
        assert_eq!(store.get("Assumptions", addr("C4")), CellValue::Number(1.05));
        assert_eq!(report.rescaled.len(), 2);
    }

    #[test]
    fn test_overrides_dual_write_and_retarget() {
        let model = model(vec![
            input("term_loan", "Assumptions", "C20", None),
            input("interest_rate", "Assumptions", "C12", Some(0.1)),
        ]);
        let rules = InputRules {
            overrides: vec![
                InputOverride {
                    key: "term_loan".into(),
                    targets: vec![CellTarget::new("Finalworkings", addr("H13"))],
                    replace_declared: false,
                },
                InputOverride {
                    key: "interest_rate".into(),
                    targets: vec![CellTarget::new("Assumptions", addr("H12"))],
                    replace_declared: true,
                },
            ],
            ..InputRules::none()
        };

        let mut store = CellStore::with_sheets(model.sheet_names());
        store.set("Assumptions", addr("C12"), "label".into()).unwrap();
        let mut diagnostics = Diagnostics::new();
        let inputs = json!({ "term_loan": 500000 });
        let report = normalize_inputs(
            &model,
            inputs.as_object().unwrap(),
            &rules,
            &mut store,
            &mut diagnostics,
        );

        assert_eq!(store.get("Assumptions", addr("C20")), CellValue::Number(500000.0));
        assert_eq!(store.get("Finalworkings", addr("H13")), CellValue::Number(500000.0));
        assert_eq!(store.get("Assumptions", addr("H12")), CellValue::Number(0.1));
        assert_eq!(store.get("Assumptions", addr("C12")), CellValue::string("label"));
        assert_eq!(report.overrides_applied, vec!["Finalworkings!H13", "Assumptions!H12"]);
    }

    #[test]
    fn test_r1c1_input_address() {
        let model = model(vec![input("units", "Assumptions", "R3C2", Some(4.0))]);
        let (store, _, _) = run(&model, json!({}), &InputRules::none());
        assert_eq!(store.get("Assumptions", addr("B3")), CellValue::Number(4.0));
    }

    #[test]
    fn test_bad_inputs_are_reported_not_fatal() {
        let model = model(vec![
            input("units", "Assumptions", "B3", None),
            input("orphan", "Missing", "A1", Some(1.0)),
        ]);
        let (store, diagnostics, report) = run(
            &model,
            json!({ "units": [1, 2], "unknown_key": 3, "blank": null }),
            &InputRules::none(),
        );

        assert!(store.get_opt("Assumptions", addr("B3")).is_none());
        let cells: Vec<&str> = diagnostics
            .of_kind(DiagnosticKind::InvalidInput)
            .map(|d| d.cell.as_str())
            .collect();
        assert_eq!(cells, vec!["units", "orphan"]);
        assert_eq!(report.ignored, vec!["unknown_key"]);
    }

    #[test]
    fn test_direct_updates() {
        let model = model(vec![]);
        let (store, diagnostics, report) = run(
            &model,
            json!({
                "updates": [
                    { "sheet": "Assumptions", "cell": "R5C3", "value": "42" },
                    { "sheet": "finalworkings", "cell": "H5", "value": "Plant" },
                    { "sheet": "Nowhere", "cell": "A1", "value": 1 },
                    { "cell": "A1", "value": 1 }
                ]
            }),
            &InputRules::none(),
        );

        assert_eq!(store.get("Assumptions", addr("C5")), CellValue::Number(42.0));
        assert_eq!(store.get("Finalworkings", addr("H5")), CellValue::string("Plant"));
        assert_eq!(report.updates_applied, vec!["Assumptions!C5", "finalworkings!H5"]);
        assert_eq!(diagnostics.len(), 2);
        assert!(report.ignored.is_empty());
    }
}
