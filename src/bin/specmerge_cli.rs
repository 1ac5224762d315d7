//! Specmerge CLI
//!
//! Commands: merge, fragments, validate
//! Outputs JSON to stdout, logs to stderr
//! Exit status reflects merge success; validation failures only change it
//! with --strict

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use specmerge_core::{
    FileOrder, MergePipeline, MergeScope, OpenApiValidator, PipelineConfig, PipelineError, SpecValidator,
};

#[derive(Parser)]
#[command(name = "specmerge-cli")]
#[command(about = "Specmerge CLI - merge templated YAML fragments into one API specification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge fragments, write outputs and validate them
    Merge {
        #[command(flatten)]
        args: MergeArgs,

        /// Exit with status 2 when validation fails
        #[arg(long)]
        strict: bool,
    },

    /// List fragment files in merge order
    Fragments {
        #[command(flatten)]
        args: MergeArgs,
    },

    /// Validate an existing specification file
    Validate {
        /// YAML or JSON specification
        file: PathBuf,
    },
}

#[derive(Args)]
struct MergeArgs {
    /// Folder holding the fragment files
    folder: Option<PathBuf>,

    /// Fragment merged before all others
    #[arg(long)]
    fragment_file: Option<String>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output file name, without extension
    #[arg(short = 'f', long)]
    output_file: Option<String>,

    /// Fragment ordering
    #[arg(long, value_enum)]
    order: Option<OrderArg>,

    /// Also write a JSON copy of the merged document
    #[arg(long)]
    json: bool,

    /// Do not write the YAML output
    #[arg(long)]
    no_yaml: bool,

    /// Skip validation of the written outputs
    #[arg(long)]
    no_validate: bool,

    /// Do not seed the template scope from the environment
    #[arg(long)]
    no_env: bool,

    /// Template variable, NAME=VALUE (repeatable)
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Name,
    Listing,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got `{}`", raw)),
    }
}

impl MergeArgs {
    fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(folder) = &self.folder {
            config.folder = folder.clone();
        }
        if let Some(fragment_file) = &self.fragment_file {
            config.fragment_file = Some(fragment_file.clone());
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if let Some(output_file) = &self.output_file {
            config.output_file = output_file.clone();
        }
        if let Some(order) = self.order {
            config.order = match order {
                OrderArg::Name => FileOrder::Name,
                OrderArg::Listing => FileOrder::Listing,
            };
        }
        config.emit_json |= self.json;
        config.emit_yaml &= !self.no_yaml;
        config.validate &= !self.no_validate;
        config
    }

    fn scope(&self) -> MergeScope {
        let mut scope = if self.no_env { MergeScope::new() } else { MergeScope::from_env() };
        scope.extend(self.vars.iter().cloned());
        scope
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "specmerge_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => match PipelineConfig::load(path) {
            Ok(config) => config,
            Err(e) => return fail(&e),
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Merge { args, strict } => {
            let pipeline = MergePipeline::new(args.apply(base), args.scope());
            match pipeline.run() {
                Ok(outcome) => {
                    let valid = outcome.valid();
                    print_json(&serde_json::json!({
                        "success": true,
                        "valid": valid,
                        "report": &outcome,
                    }));
                    if strict && !valid {
                        ExitCode::from(2) // Validation failure
                    } else {
                        ExitCode::SUCCESS
                    }
                }
                Err(e) => fail(&e),
            }
        }

        Commands::Fragments { args } => {
            let pipeline = MergePipeline::new(args.apply(base), MergeScope::new());
            match pipeline.fragments() {
                Ok(files) => {
                    print_json(&files);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&e),
            }
        }

        Commands::Validate { file } => {
            let result = OpenApiValidator::new().validate_file(&file);
            print_json(&result);
            if result.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to encode report: {}", e),
    }
}

fn fail(error: &PipelineError) -> ExitCode {
    tracing::error!("{}", error);
    print_json(&serde_json::json!({
        "success": false,
        "error": error.to_string(),
    }));
    ExitCode::FAILURE
}
