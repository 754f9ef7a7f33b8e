//! Sheetcalc CLI - calculate workbook documents from the command line

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use sheetcalc::prelude::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sheetcalc")]
#[command(
    author,
    version,
    about = "Multi-sheet workbook calculation tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate a workbook and write the result envelope as JSON
    #[command(alias = "run")]
    Calc {
        /// Workbook document (yaml, yml or json)
        workbook: PathBuf,

        /// JSON object of named inputs
        #[arg(short, long)]
        inputs: Option<PathBuf>,

        /// Engine configuration (yaml or json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only output these sheets (repeatable)
        #[arg(short, long = "sheet")]
        sheets: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,

        /// Print every diagnostic to stderr
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check the sheet order for references to formulas calculated later
    Validate {
        /// Workbook document
        workbook: PathBuf,

        /// Engine configuration (yaml or json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show information about a workbook document
    Info {
        /// Workbook document
        workbook: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Calc {
            workbook,
            inputs,
            config,
            sheets,
            output,
            pretty,
            verbose,
        } => calc(
            &workbook,
            inputs.as_deref(),
            config.as_deref(),
            &sheets,
            output.as_deref(),
            pretty,
            verbose,
        ),
        Commands::Validate { workbook, config } => validate(&workbook, config.as_deref()),
        Commands::Info { workbook } => show_info(&workbook),
    }
}

fn open(path: &Path) -> Result<WorkbookModel> {
    load_workbook(path).with_context(|| format!("Failed to load '{}'", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration '{}'", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_inputs(path: Option<&Path>) -> Result<Map<String, Value>> {
    let Some(path) = path else {
        return Ok(Map::new());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inputs '{}'", path.display()))?;
    match serde_json::from_str::<Value>(&text)
        .with_context(|| format!("Failed to parse inputs '{}'", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("Inputs '{}' must be a JSON object", path.display()),
    }
}

fn calc(
    workbook: &Path,
    inputs: Option<&Path>,
    config: Option<&Path>,
    sheets: &[String],
    output: Option<&Path>,
    pretty: bool,
    verbose: bool,
) -> Result<()> {
    let model = open(workbook)?;
    let engine = Engine::new(load_config(config)?);
    let inputs = load_inputs(inputs)?;

    let result = engine.calculate(&model, &inputs);
    let filter = (!sheets.is_empty()).then_some(sheets);
    let envelope = format_output(&model, &result, engine.config(), filter);

    eprintln!(
        "Calculated {} of {} formulas ({} diagnostics)",
        result.stats.total_calculated,
        result.stats.total_formulas,
        envelope.diagnostics.len()
    );
    if verbose {
        for diagnostic in envelope.diagnostics.iter() {
            eprintln!("  {}", diagnostic);
        }
    }

    let json = if pretty {
        serde_json::to_string_pretty(&envelope)
    } else {
        serde_json::to_string(&envelope)
    }
    .context("Failed to serialize result")?;

    if let Some(output_path) = output {
        std::fs::write(output_path, json.as_bytes())
            .with_context(|| format!("Failed to write '{}'", output_path.display()))?;
        eprintln!("Wrote result to '{}'", output_path.display());
    } else {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(json.as_bytes())
            .and_then(|_| stdout.write_all(b"\n"))
            .context("Failed to write to stdout")?;
    }

    Ok(())
}

fn validate(workbook: &Path, config: Option<&Path>) -> Result<()> {
    let model = open(workbook)?;
    let engine = Engine::new(load_config(config)?);

    let diagnostics = engine.validate(&model);
    if diagnostics.is_empty() {
        println!("Sheet order OK");
        return Ok(());
    }

    for diagnostic in diagnostics.iter() {
        println!("{}", diagnostic);
    }
    eprintln!("{} problems found", diagnostics.len());

    Ok(())
}

fn show_info(workbook: &Path) -> Result<()> {
    let model = open(workbook)?;

    println!("File: {}", workbook.display());
    println!("Sheets: {}", model.sheets.len());
    println!("Formulas: {}", model.formula_count());
    println!("Inputs: {}", model.inputs.len());

    for (i, sheet) in model.sheets.iter().enumerate() {
        println!();
        println!("  Sheet {}: \"{}\"", i, sheet.name);
        println!("    Formulas: {}", sheet.formulas.len());
        println!("    Values: {}", sheet.static_values.len());
    }

    if !model.inputs.is_empty() {
        println!();
        for input in &model.inputs {
            let default = input
                .default_value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "  {}\t{}!{}\t{}",
                input.key, input.sheet, input.cell_address, default
            );
        }
    }

    Ok(())
}
