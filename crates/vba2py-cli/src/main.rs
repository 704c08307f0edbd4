use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use vba2py_extract::{detect_with_name, extract_formulas, extract_with_options, ExtractOptions};
use vba2py_model::{ConversionResult, ContainerFormat, FormulaRecord};
use vba2py_transpile::naming::module_file_stem;
use vba2py_transpile::{convert_extraction, convert_formula_named, BatchOptions, ConvertOptions, MappingTables};

#[derive(Debug, Parser)]
#[command(name = "vba2py")]
#[command(about = "Extract VBA macros from Excel workbooks and convert them to Python.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config file with `extract` and `convert` sections.
    #[arg(long, global = true, env = "VBA2PY_CONFIG")]
    config: Option<PathBuf>,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    /// Log more (`-v` info, `-vv` debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report the container format and whether the file name matches it.
    Detect(InputArgs),
    /// List the macro modules recovered from a workbook.
    Extract(InputArgs),
    /// Extract, classify and convert every module to Python.
    Convert(ConvertArgs),
    /// Convert one spreadsheet formula.
    Formula(FormulaArgs),
    /// List the cell formulas of a workbook with their conversions.
    Formulas(InputArgs),
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Optional input file path. If omitted, reads bytes from stdin.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Input size limit in MiB, overriding the config.
    #[arg(long = "max-input-mb")]
    max_input_mb: Option<usize>,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Also write `<module>.py` for each successfully converted module.
    #[arg(long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Modules not started within this many milliseconds are reported as timed out.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Worker threads for the batch.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Debug, Args)]
struct FormulaArgs {
    /// Formula text, with or without the leading `=`.
    text: String,

    /// Label for the result, e.g. `Sheet1!B2`.
    #[arg(long, default_value = "formula")]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    extract: ExtractOptions,
    convert: ConvertOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectReport {
    format: ContainerFormat,
    suggested_extension: Option<&'static str>,
    extension_mismatch: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FormulaReport {
    #[serde(flatten)]
    record: FormulaRecord,
    conversion: ConversionResult,
}

const MIB: usize = 1024 * 1024;

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid config {}: {e}", path.display()))
}

fn read_all_input(input: &Option<PathBuf>, limit: usize) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let cap = limit as u64 + 1;
    match input {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            file.take(cap)
                .read_to_end(&mut buf)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        }
        None => {
            io::stdin()
                .lock()
                .take(cap)
                .read_to_end(&mut buf)
                .map_err(|e| format!("Failed to read stdin: {e}"))?;
        }
    }
    if buf.len() > limit {
        return Err(format!("Input is larger than the {limit}-byte limit"));
    }
    Ok(buf)
}

/// Writes one JSON document to stdout. A closed pipe is not an error.
fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<(), String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| format!("Failed to serialize output: {e}"))?;
    let mut stdout = io::stdout().lock();
    match writeln!(stdout, "{text}").and_then(|()| stdout.flush()) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other.map_err(|e| format!("Failed to write output: {e}")),
    }
}

fn extract_options(config: &Config, input: &InputArgs) -> ExtractOptions {
    let mut options = config.extract.clone();
    if let Some(mb) = input.max_input_mb {
        options.max_input_bytes = mb.saturating_mul(MIB);
    }
    options
}

fn write_modules(dir: &Path, results: &[ConversionResult]) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;
    for result in results.iter().filter(|r| r.success) {
        let path = dir.join(format!("{}.py", module_file_stem(&result.module_name)));
        std::fs::write(&path, &result.generated_code).map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;
    let tables = MappingTables::standard();

    match cli.command {
        Command::Detect(args) => {
            let options = extract_options(&config, &args);
            let bytes = read_all_input(&args.input, options.max_input_bytes)?;
            let file_name = args
                .input
                .as_deref()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let detection = detect_with_name(&bytes, file_name);
            emit(
                &DetectReport {
                    format: detection.format,
                    suggested_extension: detection.suggested_extension,
                    extension_mismatch: detection.extension_mismatch,
                },
                cli.pretty,
            )
        }
        Command::Extract(args) => {
            let options = extract_options(&config, &args);
            let bytes = read_all_input(&args.input, options.max_input_bytes)?;
            let extraction = extract_with_options(&bytes, &options).map_err(|e| e.to_string())?;
            log::info!(
                "recovered {} modules ({} failed) from {} input",
                extraction.modules.len(),
                extraction.failures.len(),
                extraction.format
            );
            emit(&extraction, cli.pretty)
        }
        Command::Convert(args) => {
            let options = extract_options(&config, &args.input);
            let bytes = read_all_input(&args.input.input, options.max_input_bytes)?;
            let extraction = extract_with_options(&bytes, &options).map_err(|e| e.to_string())?;
            let batch = BatchOptions {
                timeout: args.timeout_ms.map(Duration::from_millis),
                threads: args.threads,
            };
            let results = convert_extraction(&extraction, tables, &config.convert, &batch);
            if let Some(dir) = &args.out_dir {
                write_modules(dir, &results)?;
            }
            emit(&results, cli.pretty)
        }
        Command::Formula(args) => {
            let result = convert_formula_named(&args.name, &args.text, tables, &config.convert);
            emit(&result, cli.pretty)
        }
        Command::Formulas(args) => {
            let options = extract_options(&config, &args);
            let bytes = read_all_input(&args.input, options.max_input_bytes)?;
            let records = extract_formulas(&bytes).map_err(|e| e.to_string())?;
            let reports: Vec<FormulaReport> = records
                .into_iter()
                .map(|record| {
                    let name = format!("{}!{}", record.sheet, record.cell_address);
                    let conversion = convert_formula_named(&name, &record.formula_text, tables, &config.convert);
                    FormulaReport { record, conversion }
                })
                .collect();
            emit(&reports, cli.pretty)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(message) = run(cli) {
        eprintln!("vba2py: {message}");
        std::process::exit(1);
    }
}
