use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use testfmt_classifier::Classifier;
use testfmt_classifier::batch::{BatchOptions, classify_batch, collect_document_paths};
use testfmt_classifier::cache::{FileCache, ResultCache};
use testfmt_classifier::output::{OutputFormat, format_batch, format_report};
use testfmt_classifier::report::ClassificationReport;
use testfmt_core::{ClassifierConfig, FormatSpec, validate_specs};
use testfmt_registry::{
    CalibrationProfile, FormatRegistry, load_specs_from_dir, load_specs_from_file,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "testfmt")]
#[command(about = "Identify the test-management tool that produced a JSON export")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Extra format spec file or directory, layered over the built-ins.
    #[arg(long, global = true)]
    registry: Vec<PathBuf>,
    /// Calibration profile (YAML) with classifier overrides and priors.
    #[arg(long, global = true)]
    calibration: Option<PathBuf>,
    /// Output format.
    #[arg(long, global = true, default_value = "json")]
    format: OutputFormat,
    /// Override the gate threshold (0.0-1.0, exclusive).
    #[arg(long, global = true)]
    gate_threshold: Option<f64>,
    /// Override the maximum document size in bytes.
    #[arg(long, global = true)]
    max_bytes: Option<usize>,
    /// Always run the full computation.
    #[arg(long, global = true)]
    no_fast_paths: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify one JSON document.
    Classify(ClassifyArgs),
    /// Classify every JSON document in files and directories.
    Batch(BatchArgs),
    /// List registered formats.
    Formats,
    /// Load and validate format spec files.
    ValidateRegistry(ValidateRegistryArgs),
}

#[derive(Debug, Args)]
struct ClassifyArgs {
    /// Document path; `-` or omitted reads stdin.
    input: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// Document files and/or directories containing JSON documents.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Number of parallel jobs (default: number of CPUs).
    #[arg(long)]
    jobs: Option<usize>,
    /// Directory for caching classification results.
    #[arg(long, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,
    /// Disable caching entirely.
    #[arg(long)]
    no_cache: bool,
    /// Write the report to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ValidateRegistryArgs {
    /// Spec files (.yaml, .yml, .json) and/or directories.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match cli.command {
        Command::Classify(args) => run_classify(&cli.global, args),
        Command::Batch(args) => run_batch(&cli.global, args),
        Command::Formats => run_formats(&cli.global),
        Command::ValidateRegistry(args) => run_validate_registry(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Builds the classifier from the layered registry, calibration profile and
/// flag overrides, in that order.
fn build_classifier(global: &GlobalArgs) -> Result<Classifier, String> {
    let registry = load_registry(&global.registry)?;

    let (registry, mut config) = match &global.calibration {
        Some(path) => {
            let profile = CalibrationProfile::load(path).map_err(|err| {
                format!("Failed to load calibration '{}': {err}", path.display())
            })?;
            profile.apply(&registry).map_err(|err| err.to_string())?
        }
        None => (registry, ClassifierConfig::default()),
    };

    if let Some(threshold) = global.gate_threshold {
        config.gate_threshold = threshold;
    }
    if let Some(max_bytes) = global.max_bytes {
        config.limits.max_bytes = max_bytes;
    }
    if global.no_fast_paths {
        config.fast_paths.enabled = false;
    }

    Classifier::new(registry, config).map_err(|err| err.to_string())
}

fn load_registry(extra: &[PathBuf]) -> Result<FormatRegistry, String> {
    let mut builder = FormatRegistry::builder().with_builtin();
    for path in extra {
        if !path.exists() {
            return Err(format!("Registry path '{}' does not exist", path.display()));
        }
        builder = builder.from_path(path);
    }
    builder.build().map_err(|err| err.to_string())
}

fn run_classify(global: &GlobalArgs, args: ClassifyArgs) -> Result<(), String> {
    let classifier = build_classifier(global)?;

    let (source, bytes) = match args.input {
        Some(path) if path.as_os_str() != "-" => {
            let bytes = fs::read(&path)
                .map_err(|err| format!("Failed to read '{}': {err}", path.display()))?;
            (path.display().to_string(), bytes)
        }
        _ => {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .map_err(|err| format!("Failed to read stdin: {err}"))?;
            ("-".to_string(), bytes)
        }
    };

    let result = classifier
        .classify_slice(&bytes)
        .map_err(|err| format!("Failed to classify '{source}': {err}"))?;
    let report = ClassificationReport::new(source, &result, classifier.registry());
    println!("{}", format_report(&report, global.format)?.trim_end());
    Ok(())
}

fn run_batch(global: &GlobalArgs, args: BatchArgs) -> Result<(), String> {
    let classifier = build_classifier(global)?;
    let paths = collect_document_paths(&args.inputs).map_err(|e| e.to_string())?;

    let cache = if args.no_cache {
        None
    } else {
        let dir = args.cache_dir.unwrap_or_else(FileCache::default_dir);
        debug!(dir = %dir.display(), "using result cache");
        Some(FileCache::new(dir))
    };
    let options = BatchOptions {
        jobs: args.jobs,
        cache: cache.as_ref().map(|cache| cache as &dyn ResultCache),
    };

    let batch = classify_batch(&classifier, &paths, options).map_err(|e| e.to_string())?;
    let raw = format_batch(&batch, global.format)?;

    match &args.output {
        Some(path) => {
            create_parent_dir(path)?;
            fs::write(path, &raw)
                .map_err(|err| format!("Failed to write '{}': {err}", path.display()))?;
            println!(
                "Classified {} document(s) into '{}'.",
                batch.total,
                path.display()
            );
        }
        None => println!("{}", raw.trim_end()),
    }

    if !batch.failures.is_empty() {
        eprintln!(
            "{} document(s) could not be classified: {}",
            batch.failures.len(),
            batch
                .failures
                .iter()
                .map(|failure| format!("{} ({})", failure.source, failure.code))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}

fn run_formats(global: &GlobalArgs) -> Result<(), String> {
    let registry = load_registry(&global.registry)?;
    let specs: Vec<&FormatSpec> = registry.specs().collect();

    let raw = match global.format {
        OutputFormat::Json => serde_json::to_string_pretty(&specs)
            .map_err(|e| format!("JSON serialization failed: {e}"))?,
        OutputFormat::Yaml => {
            serde_yaml::to_string(&specs).map_err(|e| format!("YAML serialization failed: {e}"))?
        }
        OutputFormat::Markdown => formats_markdown(&registry),
        OutputFormat::Table => formats_table(&registry),
    };
    println!("{}", raw.trim_end());
    Ok(())
}

fn formats_markdown(registry: &FormatRegistry) -> String {
    let mut out = String::from("# Registered Formats\n");
    for format in registry.formats() {
        let spec = format.spec();
        out.push_str(&format!("\n## {} (`{}`)\n\n", spec.name, spec.id));
        if let Some(description) = &spec.description {
            out.push_str(&format!("{description}\n\n"));
        }
        out.push_str(&format!("- **Prior:** {:.3}\n", format.prior()));
        if format.is_sentinel() {
            out.push_str("- **Sentinel:** yes\n");
        }
        let required: Vec<&str> = spec.required_fields.iter().map(|f| f.name()).collect();
        if !required.is_empty() {
            out.push_str(&format!("- **Required:** {}\n", required.join(", ")));
        }
        let optional: Vec<&str> = spec.optional_fields.iter().map(|f| f.name()).collect();
        if !optional.is_empty() {
            out.push_str(&format!("- **Optional:** {}\n", optional.join(", ")));
        }
        let patterns: Vec<&str> = spec.patterns.iter().map(|p| p.name.as_str()).collect();
        if !patterns.is_empty() {
            out.push_str(&format!("- **Patterns:** {}\n", patterns.join(", ")));
        }
    }
    out
}

fn formats_table(registry: &FormatRegistry) -> String {
    let mut out = format!(
        "{:<16} {:<32} {:>6} {:>8} {:>6}\n",
        "ID", "NAME", "FIELDS", "PATTERNS", "PRIOR"
    );
    for format in registry.formats() {
        let spec = format.spec();
        out.push_str(&format!(
            "{:<16} {:<32} {:>6} {:>8} {:>6.3}\n",
            spec.id.as_str(),
            spec.name,
            format.fields().len(),
            format.patterns().len(),
            format.prior()
        ));
    }
    out
}

fn run_validate_registry(args: ValidateRegistryArgs) -> Result<(), String> {
    let mut specs = Vec::new();
    for path in &args.paths {
        let loaded = if path.is_dir() {
            load_specs_from_dir(path)
        } else if path.is_file() {
            load_specs_from_file(path)
        } else {
            return Err(format!("Spec path '{}' does not exist", path.display()));
        };
        specs.extend(loaded.map_err(|err| format!("Failed to load '{}': {err}", path.display()))?);
    }

    let errors = validate_specs(&specs);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("  {error}");
        }
        return Err(format!("{} spec problem(s) found", errors.len()));
    }
    let registry = FormatRegistry::from_specs(specs).map_err(|err| err.to_string())?;

    println!(
        "Validated {} format spec(s) from {} path(s).",
        registry.len(),
        args.paths.len()
    );
    Ok(())
}

fn create_parent_dir(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                format!(
                    "Failed to create output directory '{}': {err}",
                    parent.display()
                )
            })?;
        }
    }
    Ok(())
}
