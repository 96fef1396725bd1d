//! Command-line surface for the template store.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ctpl",
    version,
    about = "Versioned contract templates with extra-clause injection",
    after_help = "Examples:\n  ctpl update --contract \"Contrato Locação\" --template base.docx --clause \"Prazo de 12 meses\"\n  ctpl exists --contract \"Contrato Locação\"\n  ctpl load --contract \"Contrato Locação\" --out atual.docx\n  ctpl config",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,

    /// JSON config file (default: <config dir>/contract-templates/config.json)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Root directory of the object store
    #[arg(long, value_name = "DIR", global = true)]
    pub store_root: Option<PathBuf>,

    /// Local scratch directory for in-flight updates
    #[arg(long, value_name = "DIR", global = true)]
    pub work_dir: Option<PathBuf>,

    /// Office suite command used for PDF conversion
    #[arg(long, value_name = "CMD", global = true)]
    pub soffice: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Update(UpdateArgs),
    Exists(ContractArgs),
    Load(LoadArgs),
    /// Print the resolved configuration as JSON
    Config,
}

/// Store a new version of a contract template.
#[derive(Args, Debug)]
#[command(about = "Inject clauses into a template, render it and store a new version")]
pub struct UpdateArgs {
    /// Contract display name; its normalized key names the storage folder
    #[arg(long)]
    pub contract: String,

    /// Base template (.docx) containing the {{CLAUSULAS_EXTRAS}} placeholder
    #[arg(long, value_name = "PATH")]
    pub template: PathBuf,

    /// Extra clause text; repeat for several clauses
    #[arg(long = "clause", value_name = "TEXT")]
    pub clauses: Vec<String>,

    /// JSON array of clause texts, appended after any --clause values
    #[arg(long, value_name = "PATH")]
    pub clauses_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(about = "Report whether a contract has a stored version")]
pub struct ContractArgs {
    #[arg(long)]
    pub contract: String,
}

#[derive(Args, Debug)]
#[command(about = "Fetch the current (highest version) editable document")]
pub struct LoadArgs {
    #[arg(long)]
    pub contract: String,

    /// Write the document here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}
