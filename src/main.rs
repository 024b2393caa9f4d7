use anyhow::{Context, Result};
use clap::Parser;
use annotation_index::archive::discover_archives;
use annotation_index::cli::{Cli, Commands, OutputFormat, ScanArgs};
use annotation_index::config::{clear_db, resolve_db_path};
use annotation_index::decoder::ScanOptions;
use annotation_index::error::Unresolved;
use annotation_index::index::IndexMap;
use annotation_index::logging::init_logging;
use annotation_index::resolve::CrossReference;
use annotation_index::session::{FailurePolicy, ScanSession, ScanSummary, SessionConfig};
use annotation_index::store::IndexStore;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Scan(args) => run_scan(&cli, args)?,
        Commands::Query { annotation, class } => {
            let store = IndexStore::open(resolve_db_path(&cli)?)?;
            let output = match (annotation, class) {
                (Some(annotation), _) => serde_json::to_value(AnnotationQuery {
                    annotation: annotation.clone(),
                    classes: store.classes_annotated_with(annotation)?,
                })?,
                (None, Some(class)) => serde_json::to_value(ClassQuery {
                    class: class.clone(),
                    annotations: store.annotations_of(class)?,
                    interfaces: store.interfaces_of(class)?,
                })?,
                (None, None) => anyhow::bail!("query needs --annotation or --class"),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Stats => {
            let store = IndexStore::open(resolve_db_path(&cli)?)?;
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
        }
        Commands::Clear => {
            clear_db(&resolve_db_path(&cli)?)?;
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct AnnotationQuery {
    annotation: String,
    classes: Option<BTreeSet<String>>,
}

#[derive(Debug, Serialize)]
struct ClassQuery {
    class: String,
    annotations: Option<BTreeSet<String>>,
    interfaces: Option<BTreeSet<String>>,
}

#[derive(Debug, Serialize)]
struct ScanOutput<'a> {
    archives: Vec<String>,
    duration_ms: u64,
    summary: &'a ScanSummary,
    cross_reference: Option<CrossReference>,
    unresolved: &'a Unresolved,
    annotations: &'a IndexMap,
    classes: &'a IndexMap,
}

fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<()> {
    let start = Instant::now();
    let archives = expand_archives(args)?;

    let config = SessionConfig {
        options: scan_options(args),
        on_entry_error: if args.keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        },
        parallel: args.parallel,
    };
    let store = if args.persist || args.merge {
        Some(IndexStore::open(resolve_db_path(cli)?)?)
    } else {
        None
    };
    let mut session = match &store {
        Some(store) if args.merge => ScanSession::with_index(config, store.load()?),
        _ => ScanSession::new(config),
    };
    let summary = session.scan_archives(&archives)?;

    let mut cross_reference = None;
    let mut unresolved = Unresolved::new();
    if args.cross_reference {
        match session.cross_reference_depth(args.ignored_packages.as_slice(), args.depth) {
            Ok(outcome) => cross_reference = Some(outcome),
            Err(err) => {
                warn!("{err}");
                cross_reference = Some(err.outcome);
                unresolved = err.unresolved;
            }
        }
    }

    let index = session.into_index();
    debug_assert!(index.is_consistent());
    info!(
        classes = index.class_count(),
        annotations = index.annotation_count(),
        indexed = summary.indexed,
        "index built"
    );

    if args.persist
        && let Some(store) = &store
    {
        store.save(&index)?;
    }

    let content = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&ScanOutput {
            archives: archives.iter().map(|p| p.to_string_lossy().to_string()).collect(),
            duration_ms: start.elapsed().as_millis() as u64,
            summary: &summary,
            cross_reference,
            unresolved: &unresolved,
            annotations: index.annotation_index(),
            classes: index.class_index(),
        })?,
        OutputFormat::Text => index.report(),
    };
    write_output(&content, args.output.as_deref())?;

    if args.strict && !unresolved.is_empty() {
        let listed: Vec<String> = unresolved
            .iter()
            .map(|(class, interfaces)| {
                let interfaces: Vec<&str> = interfaces.iter().map(String::as_str).collect();
                format!("{class} -> {}", interfaces.join(", "))
            })
            .collect();
        anyhow::bail!("Unresolved interfaces:\n  {}", listed.join("\n  "));
    }

    Ok(())
}

fn scan_options(args: &ScanArgs) -> ScanOptions {
    ScanOptions::default()
        .with_class_annotations(!args.no_class)
        .with_method_annotations(!args.no_method)
        .with_parameter_annotations(!args.no_parameter)
        .with_field_annotations(!args.no_field)
}

fn expand_archives(args: &ScanArgs) -> Result<Vec<PathBuf>> {
    if !args.discover {
        return Ok(args.archives.clone());
    }

    let mut archives = Vec::new();
    for path in &args.archives {
        if path.is_dir() {
            let jars = discover_archives(path)
                .with_context(|| format!("Failed to search for jars in: {}", path.display()))?;
            archives.extend(jars);
        } else {
            archives.push(path.clone());
        }
    }
    Ok(archives)
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write output: {}", path.display()))?;
    } else {
        print!("{content}");
        if !content.ends_with('\n') {
            println!();
        }
    }

    Ok(())
}
