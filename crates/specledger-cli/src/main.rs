use clap::{Parser, Subcommand};
use specledger_cli::cmd::{self, deps::DepsSubcommand, issue::IssueSubcommand, new::NewArgs};
use specledger_cli::{errors, root};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sl",
    about = "SpecLedger: bootstrap spec-driven projects, lock spec dependencies and track issues per spec",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from specledger/specledger.yaml or .git/)
    #[arg(long, global = true, env = "SPECLEDGER_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project from a playbook
    New(NewArgs),

    /// Initialize SpecLedger in the current project
    Init {
        /// Project short code (2-10 alphanumeric characters)
        #[arg(long)]
        short_code: Option<String>,
        /// Playbook to apply (default: the first bundled playbook)
        #[arg(long)]
        playbook: Option<String>,
        /// Overwrite existing project metadata
        #[arg(long)]
        force: bool,
    },

    /// Manage external spec dependencies (spec.mod / spec.sum)
    Deps {
        #[command(subcommand)]
        subcommand: DepsSubcommand,
    },

    /// Check that required external tools are installed
    Doctor,

    /// Track issues scoped to a spec
    Issue {
        #[command(subcommand)]
        subcommand: IssueSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::New(args) => cmd::new::run(args, cli.json),
        Commands::Init {
            short_code,
            playbook,
            force,
        } => cmd::init::run(&root, short_code.as_deref(), playbook.as_deref(), force, cli.json),
        Commands::Deps { subcommand } => cmd::deps::run(&root, subcommand, cli.json),
        Commands::Doctor => match cmd::doctor::run(cli.json) {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(errors::EXIT_FAILURE),
            Err(e) => Err(e),
        },
        Commands::Issue { subcommand } => cmd::issue::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        std::process::exit(errors::report(&e));
    }
}
