//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;

use super::item::{self, CreateArgs, ListArgs, UpdateArgs};
use super::logging;
use super::output::{Output, OutputFormat};
use super::session::GlobalArgs;
use crate::storage::Config;

#[derive(Parser)]
#[command(name = "life")]
#[command(author, version, about = "Manage your life items in a Notion database")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Increase diagnostic output (-v, -vv, -vvv)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file
    #[arg(long, global = true, env = "LIFE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Notion integration secret (overrides the configuration file)
    #[arg(long, global = true, env = "LIFE_API_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a configuration template
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Create an item
    #[command(alias = "add")]
    Create(CreateArgs),

    /// List items (open items unless filtered)
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one item
    Show {
        /// Item id or unique prefix
        id: String,
    },

    /// Open an item in the browser (pick from open items without an id)
    Open {
        /// Item id or unique prefix
        id: Option<String>,
    },

    /// Change fields of an item
    #[command(alias = "edit")]
    Update(UpdateArgs),

    /// Archive an item in the remote database
    #[command(alias = "rm")]
    Delete {
        /// Item id or unique prefix
        id: String,
    },

    /// Search the local mirror without contacting the remote database
    Search {
        /// Search words
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let output = Output::new(cli.format);
    let globals = GlobalArgs {
        config: cli.config,
        secret: cli.secret,
    };

    debug!("life starting");

    match cli.command {
        Commands::Init { force } => init(&globals, &output, force)?,
        Commands::Create(args) => item::create(&args, &globals, &output)?,
        Commands::List(args) => item::list(&args, &globals, &output)?,
        Commands::Show { id } => item::show(&id, &globals, &output)?,
        Commands::Open { id } => item::open(id.as_deref(), &globals, &output)?,
        Commands::Update(args) => item::update(&args, &globals, &output)?,
        Commands::Delete { id } => item::delete(&id, &globals, &output)?,
        Commands::Search { query } => item::search(&query.join(" "), &globals, &output)?,
    }

    debug!("command completed");
    Ok(())
}

fn init(globals: &GlobalArgs, output: &Output, force: bool) -> Result<()> {
    let path = globals.config_path()?;
    Config::write_template(&path, force)?;

    if output.is_json() {
        output.data(&serde_json::json!({ "config": path.display().to_string() }));
    } else {
        output.success(&format!("Wrote configuration template to {}", path.display()));
        output.success("Set database.id and the API secret (or LIFE_API_SECRET) before use");
    }
    Ok(())
}
