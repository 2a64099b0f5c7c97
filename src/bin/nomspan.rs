//! nomspan CLI - compile pattern stores and normalize LLM span attributes
//!
//! This CLI tool compiles YAML pattern stores into provider bundles and runs
//! detection or normalization over JSON attribute maps.

use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use nomspan::{BundleLoader, CompileOptions, NormalizationEngine, NormalizerConfig};

#[derive(Parser)]
#[command(name = "nomspan")]
#[command(version, about = "Provider detection and schema normalization for LLM span attributes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a pattern store into bundle.json and bundle.meta.json
    Compile {
        /// Pattern store directory
        #[arg(short, long, default_value = "patterns")]
        patterns: PathBuf,

        /// Output directory for the compiled bundle
        #[arg(short, long, default_value = "build/bundle")]
        output: PathBuf,
    },

    /// Validate a pattern store without writing a bundle
    Validate {
        /// Pattern store directory
        #[arg(short, long, default_value = "patterns")]
        patterns: PathBuf,
    },

    /// Print the provider detected for each attribute map
    Detect {
        #[command(flatten)]
        source: BundleArgs,

        /// JSON file with one attribute map or an array of them ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Print the normalized record for each attribute map
    Normalize {
        #[command(flatten)]
        source: BundleArgs,

        /// JSON file with one attribute map or an array of them ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: String,
    },
}

#[derive(clap::Args)]
struct BundleArgs {
    /// Path to nomspan.yaml; overrides --bundle and --patterns
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the compiled bundle
    #[arg(short, long)]
    bundle: Option<PathBuf>,

    /// Pattern store directory; enables development mode
    #[arg(short, long)]
    patterns: Option<PathBuf>,
}

impl BundleArgs {
    fn into_config(self) -> Result<NormalizerConfig, String> {
        if let Some(path) = self.config {
            return NormalizerConfig::from_file(&path).map_err(|e| e.to_string());
        }
        match (self.bundle, self.patterns) {
            (Some(bundle), Some(patterns)) => Ok(NormalizerConfig::development(bundle, patterns)),
            (Some(bundle), None) => Ok(NormalizerConfig::production(bundle)),
            (None, _) => Err("either --config or --bundle is required".to_string()),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile { patterns, output } => compile_patterns(patterns, output),
        Commands::Validate { patterns } => validate_patterns(patterns),
        Commands::Detect { source, input } => detect(source, &input),
        Commands::Normalize { source, input } => normalize(source, &input),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Compile a pattern store and write both artifacts
fn compile_patterns(patterns: PathBuf, output: PathBuf) -> Result<(), String> {
    println!("🔧 Compiling pattern store {}...", patterns.display());

    let compiled = nomspan::compile_dir(&patterns, &CompileOptions::default())
        .map_err(|e| format!("Compilation failed: {}", e))?;

    println!(
        "  ✓ Compiled {} providers, {} signatures",
        compiled.bundle.providers.len(),
        compiled.bundle.signature_count()
    );
    for overlap in compiled.warnings() {
        println!(
            "  ⚠ {} ({}) shadows {} ({})",
            overlap.winner, overlap.winner_signature, overlap.shadowed, overlap.shadowed_signature
        );
    }

    compiled
        .write_to(&output)
        .map_err(|e| format!("Failed to write bundle: {}", e))?;

    println!("  ✓ Content hash {}", compiled.metadata.content_hash);
    println!("✨ Bundle written to {}", output.display());
    Ok(())
}

/// Validate a pattern store without writing artifacts
fn validate_patterns(patterns: PathBuf) -> Result<(), String> {
    println!("🔍 Validating pattern store {}...", patterns.display());

    let options = CompileOptions::default();
    println!(
        "  Transform kinds: {}",
        options.registry.list_transforms().join(", ")
    );
    let compiled = nomspan::compile_dir(&patterns, &options)
        .map_err(|e| format!("Validation failed: {}", e))?;

    for counts in &compiled.metadata.providers {
        println!(
            "  ✓ {}: {} signatures, {} mappings, {} transforms",
            counts.provider, counts.signatures, counts.mappings, counts.transforms
        );
    }
    if compiled.metadata.overlap_warnings > 0 {
        println!("  ⚠ {} signature overlaps", compiled.metadata.overlap_warnings);
    }

    println!("✅ Pattern store is valid");
    Ok(())
}

fn detect(source: BundleArgs, input: &str) -> Result<(), String> {
    let engine = build_engine(source)?;

    let results: Vec<JsonValue> = read_inputs(input)?
        .iter()
        .map(|value| {
            let attributes = to_attributes(value);
            match engine.detect_match(&attributes) {
                Some(found) => serde_json::json!({
                    "provider": found.provider,
                    "signature": found.signature,
                    "confidence": found.confidence,
                }),
                None => serde_json::json!({ "provider": nomspan::UNKNOWN_PROVIDER }),
            }
        })
        .collect();

    print_json(&results)
}

fn normalize(source: BundleArgs, input: &str) -> Result<(), String> {
    let engine = build_engine(source)?;

    let records = read_inputs(input)?
        .iter()
        .map(|value| engine.normalize_value(value).to_json())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to serialize record: {}", e))?;

    print_json(&records)
}

fn build_engine(source: BundleArgs) -> Result<NormalizationEngine, String> {
    let config = source.into_config()?;
    let loader = BundleLoader::new(config);
    NormalizationEngine::from_loader(&loader).map_err(|e| e.to_string())
}

/// Read one attribute map or an array of them
fn read_inputs(input: &str) -> Result<Vec<JsonValue>, String> {
    let contents = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        buf
    } else {
        std::fs::read_to_string(Path::new(input))
            .map_err(|e| format!("Failed to read {}: {}", input, e))?
    };

    let value: JsonValue =
        serde_json::from_str(&contents).map_err(|e| format!("Invalid JSON input: {}", e))?;

    Ok(match value {
        JsonValue::Array(items) => items,
        other => vec![other],
    })
}

fn to_attributes(value: &JsonValue) -> nomspan::Attributes {
    value
        .as_object()
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn print_json(values: &[JsonValue]) -> Result<(), String> {
    let output = match values {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(many),
    }
    .map_err(|e| format!("Failed to serialize output: {}", e))?;

    println!("{}", output);
    Ok(())
}
