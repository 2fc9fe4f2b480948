//! textbook CLI tool
//!
//! Build-step interface to textbook-core.
//!
//! ## Commands
//!
//! - `compile`: Compile the content tree into the JSON artifact
//! - `stats <artifact>`: Summarize a compiled artifact
//! - `questions <artifact> [concept maps...]`: Resolve practice-exam questions as JSON
//! - `url <artifact> <path>`: Print the served URL of an asset
//!
//! Configuration is read from `textbook.toml` in the current directory unless `--config` says
//! otherwise. Command line flags override the file.

use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use textbook_core::{
    compiler::{CompiledContent, CompiledStats, ContentCompiler, EntryKind},
    config::{Deployment, TextbookConfig, CONFIG_FILE_NAME, DEPLOYMENT_ENV_VAR},
    resolver::QuestionResolver,
    service::ContentService,
};

#[derive(Parser)]
#[command(name = "textbook")]
#[command(author, version, about = "Compile textbook content and resolve practice exams", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the content tree and write the artifact
    Compile {
        /// Content root (overrides `compiler.root`)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Artifact path (overrides `compiler.output`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep non-markdown, non-YAML files as opaque entries
        #[arg(long)]
        pass_through: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print statistics for a compiled artifact
    Stats {
        /// Path to the compiled artifact
        artifact: PathBuf,
    },

    /// Resolve concept maps into the ordered question list (JSON on stdout)
    Questions {
        /// Path to the compiled artifact
        artifact: PathBuf,

        /// Concept maps to resolve (default: `resolver.concept_maps`)
        concept_maps: Vec<String>,

        /// Exit non-zero if any concept map or question was skipped
        #[arg(long)]
        strict: bool,
    },

    /// Print the URL an asset is served under
    Url {
        /// Path to the compiled artifact
        artifact: PathBuf,

        /// Asset path relative to the content root
        path: String,

        /// Deployment target (dev or prod).
        /// Can also be set via TEXTBOOK_DEPLOYMENT environment variable
        #[arg(long)]
        deployment: Option<String>,
    },
}

fn print_stats(stats: &CompiledStats) {
    println!("Files: {} ({} bytes)", stats.total_files, stats.total_bytes);
    for kind in [EntryKind::Markdown, EntryKind::Yaml, EntryKind::Opaque] {
        let files = stats.files_of(kind);
        if files > 0 {
            let bytes = stats.bytes_by_kind.get(&kind).copied().unwrap_or(0);
            println!("  {kind}: {files} ({bytes} bytes)");
        }
    }
    if stats.ignored > 0 {
        println!("Ignored: {}", stats.ignored);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let mut config = TextbookConfig::from_file(&config_path)?;

    match cli.command {
        Commands::Compile {
            root,
            output,
            pass_through,
            verbose,
        } => {
            if let Some(root) = root {
                config.compiler.root = root;
            }
            if let Some(output) = output {
                config.compiler.output = output;
            }
            if pass_through {
                config.compiler.opaque = textbook_core::config::OpaquePolicy::PassThrough;
            }

            let compiler = ContentCompiler::new(&config.compiler);
            let content = match compiler.compile_path(&config.compiler.root) {
                Ok(content) => content,
                Err(e) => {
                    eprintln!("Error: compilation failed: {e}");
                    std::process::exit(1);
                }
            };
            content.write_to(&config.compiler.output)?;

            println!(
                "Compiled {} into {}",
                config.compiler.root.display(),
                config.compiler.output.display()
            );
            print_stats(&content.stats);
            if verbose {
                for (path, entry) in &content.entries {
                    println!("  [{}] {path}", entry.kind);
                }
            }
        }

        Commands::Stats { artifact } => {
            let content = CompiledContent::read_from(&artifact)?;
            print_stats(&content.stats);
        }

        Commands::Questions {
            artifact,
            concept_maps,
            strict,
        } => {
            let concept_maps = if concept_maps.is_empty() {
                config.resolver.concept_maps.clone()
            } else {
                concept_maps
            };

            let service = Arc::new(ContentService::new(config.assets.clone()));
            service.initialize(CompiledContent::read_from(&artifact)?);
            let resolver = QuestionResolver::with_config(service, &config.resolver);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            let resolution = runtime.block_on(resolver.resolve_with_report(&concept_maps));

            println!("{}", serde_json::to_string_pretty(&resolution.questions)?);
            if !resolution.is_complete() {
                eprintln!(
                    "{} questions resolved, {} skipped",
                    resolution.questions.len(),
                    resolution.failure_count()
                );
                for failure in &resolution.failures {
                    eprintln!("  {} {}: {}", failure.scope, failure.path, failure.error);
                }
                if strict {
                    std::process::exit(1);
                }
            }
        }

        Commands::Url {
            artifact,
            path,
            deployment,
        } => {
            let deployment: Deployment = match deployment
                .or_else(|| std::env::var(DEPLOYMENT_ENV_VAR).ok())
            {
                Some(name) => name.parse()?,
                None => Deployment::default(),
            };
            let service = ContentService::new(config.assets.clone());
            service.initialize(CompiledContent::read_from(&artifact)?);
            println!("{}", service.asset_url(&path, deployment)?);
        }
    }

    Ok(())
}
