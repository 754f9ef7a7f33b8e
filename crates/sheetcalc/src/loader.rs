//! Workbook loading from YAML or JSON documents

use crate::error::{Error, Result};
use sheetcalc_core::WorkbookModel;
use std::path::Path;

/// Document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    Yaml,
    Json,
}

impl WorkbookFormat {
    /// Format implied by a file extension
    ///
    /// Anything that is not `.json` is read as YAML, which also accepts JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => WorkbookFormat::Json,
            _ => WorkbookFormat::Yaml,
        }
    }
}

/// Parse an in-memory workbook document
pub fn parse_workbook(text: &str, format: WorkbookFormat) -> Result<WorkbookModel> {
    let model: WorkbookModel = match format {
        WorkbookFormat::Yaml => serde_yaml::from_str(text)?,
        WorkbookFormat::Json => serde_json::from_str(text)?,
    };
    let model = model.finalize()?;
    check_metadata(&model);
    Ok(model)
}

/// Load a workbook document from disk
pub fn load_workbook<P: AsRef<Path>>(path: P) -> Result<WorkbookModel> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    log::debug!("loaded {} bytes from {}", text.len(), path.display());
    parse_workbook(&text, WorkbookFormat::from_path(path))
}

/// Load a workbook document from disk without blocking the runtime
pub async fn load_workbook_async<P: AsRef<Path>>(path: P) -> Result<WorkbookModel> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    log::debug!("loaded {} bytes from {}", text.len(), path.display());
    parse_workbook(&text, WorkbookFormat::from_path(path))
}

/// Declared counts are informational; disagreement is only worth a warning
fn check_metadata(model: &WorkbookModel) {
    if let Some(declared) = model.metadata.total_sheets {
        if declared != model.sheets.len() {
            log::warn!(
                "metadata declares {} sheets, document has {}",
                declared,
                model.sheets.len()
            );
        }
    }
    if let Some(declared) = model.metadata.total_formulas {
        let actual = model.formula_count();
        if declared != actual {
            log::warn!(
                "metadata declares {} formulas, document has {}",
                declared,
                actual
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcalc_core::{CellAddress, CellValue};

    const YAML: &str = r#"
metadata: { total_sheets: 1, total_formulas: 1 }
inputs:
  interest_rate: { sheet: Assumptions, cell_address: H12, default_value: 12 }
sheets:
  Assumptions:
    formulas:
      - { cell_address: C5, formula_text: "=C3*C4", row: 5, col: 3 }
    static_values:
      - { cell_address: C3, value: 100, row: 3, col: 3, value_type: number }
"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(WorkbookFormat::from_path("a.json"), WorkbookFormat::Json);
        assert_eq!(WorkbookFormat::from_path("a.JSON"), WorkbookFormat::Json);
        assert_eq!(WorkbookFormat::from_path("a.yml"), WorkbookFormat::Yaml);
        assert_eq!(WorkbookFormat::from_path("workbook"), WorkbookFormat::Yaml);
    }

    #[test]
    fn test_parse_yaml() {
        let model = parse_workbook(YAML, WorkbookFormat::Yaml).unwrap();
        assert_eq!(model.sheets.len(), 1);
        assert_eq!(model.inputs[0].key, "interest_rate");
        assert_eq!(model.inputs[0].default_value, Some(CellValue::Number(12.0)));

        let sheet = &model.sheets[0];
        assert_eq!(sheet.name, "Assumptions");
        assert_eq!(sheet.formulas[0].cell_address, CellAddress::parse("C5").unwrap());
        assert_eq!(sheet.static_values[0].value, CellValue::Number(100.0));
    }

    #[test]
    fn test_json_is_valid_yaml() {
        let json = r#"{"sheets": {"S": {"formulas": [{"cell_address": "A1", "formula_text": "=1"}]}}}"#;
        let from_json = parse_workbook(json, WorkbookFormat::Json).unwrap();
        let from_yaml = parse_workbook(json, WorkbookFormat::Yaml).unwrap();
        assert_eq!(from_json.formula_count(), 1);
        assert_eq!(from_yaml.formula_count(), 1);
        assert_eq!(from_json.sheets[0].formulas[0].row, 1);
    }

    #[test]
    fn test_malformed_documents_fail() {
        assert!(matches!(
            parse_workbook("sheets: [", WorkbookFormat::Yaml),
            Err(Error::Yaml(_))
        ));
        assert!(matches!(
            parse_workbook("{", WorkbookFormat::Json),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            parse_workbook(
                "sheets: { S: { formulas: [ { cell_address: 'not a cell', formula_text: '=1' } ] } }",
                WorkbookFormat::Yaml
            ),
            Err(Error::Yaml(_))
        ));
    }

    #[test]
    fn test_duplicate_sheets_are_invalid() {
        let result = parse_workbook("sheets: { PLBS: {}, ' plbs': {} }", WorkbookFormat::Yaml);
        assert!(matches!(result, Err(Error::InvalidWorkbook(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_workbook("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }
}
