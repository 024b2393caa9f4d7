use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "annotation-index")]
#[command(about = "Index compiled Java classes by the annotations they use")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Scan class directories and jars, then print the index.
    Scan(ScanArgs),
    /// Look up a persisted index.
    Query {
        #[arg(long, value_name = "NAME", conflicts_with = "class", required_unless_present = "class")]
        annotation: Option<String>,

        #[arg(long, value_name = "NAME")]
        class: Option<String>,
    },
    Stats,
    Clear,
}

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Class directories or jar files.
    #[arg(required = true, value_name = "ARCHIVE")]
    pub archives: Vec<PathBuf>,

    /// Treat directory arguments as roots to search for jars.
    #[arg(long)]
    pub discover: bool,

    #[arg(long)]
    pub no_class: bool,

    #[arg(long)]
    pub no_method: bool,

    #[arg(long)]
    pub no_parameter: bool,

    #[arg(long)]
    pub no_field: bool,

    /// Skip class files that fail to decode instead of stopping.
    #[arg(long)]
    pub keep_going: bool,

    #[arg(long)]
    pub parallel: bool,

    /// Copy interface annotations onto implementing classes.
    #[arg(long)]
    pub cross_reference: bool,

    #[arg(long = "ignore-package", value_name = "PREFIX", requires = "cross_reference")]
    pub ignored_packages: Vec<String>,

    /// Number of cross-reference passes.
    #[arg(long, value_name = "N", default_value_t = 1, requires = "cross_reference")]
    pub depth: usize,

    /// Fail when implemented interfaces were never scanned.
    #[arg(long, requires = "cross_reference")]
    pub strict: bool,

    /// Save the index to the database.
    #[arg(long)]
    pub persist: bool,

    /// Start from the persisted index instead of an empty one. Rescanned
    /// classes replace their stored entries.
    #[arg(long)]
    pub merge: bool,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
