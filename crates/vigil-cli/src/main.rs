//! Vigil - command line front end for KeePass databases with breach checks.

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vigil_core::generator::{GeneratorOptions, DEFAULT_LENGTH};

use config::Config;

/// Vigil - KeePass credential manager with breach intelligence
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(about = "Inspect, reorganize and breach-check KeePass databases")]
struct Args {
    /// Path to config file (default: ~/.config/vigil/vigil.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the KeePass database (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the group tree
    Tree {
        /// Show group and entry ids
        #[arg(long)]
        ids: bool,
    },
    /// Fuzzy search entries by title, username or URL
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Check every password (and optionally every email) for breaches
    Scan {
        /// Also check usernames that are email addresses
        #[arg(long)]
        emails: bool,
    },
    /// Show cached findings without touching the network
    Report,
    /// Forget cached breach results
    ClearCache {
        /// Clear the caches of every database, not only this one
        #[arg(long)]
        all: bool,
    },
    /// Create a group under PARENT (a group id, or "root")
    AddGroup { parent: String, name: String },
    /// Rename a group
    RenameGroup { group: String, name: String },
    /// Move a group under a new parent
    MoveGroup { group: String, parent: String },
    /// Move an entry into another group
    MoveEntry { entry: String, group: String },
    /// Delete a group with everything below it
    RemoveGroup { group: String },
    /// Delete an entry
    RemoveEntry { entry: String },
    /// Import a browser password export (CSV) into a new "Imported" group
    ImportCsv { path: PathBuf },
    /// Print a random password
    Generate(GenerateArgs),
    /// Replace an entry's password with a generated one using the same character sets
    SetPassword {
        entry: String,
        /// Override the length of the current password
        #[arg(short, long)]
        length: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    #[arg(short, long, default_value_t = DEFAULT_LENGTH)]
    length: usize,
    /// Leave out upper-case letters
    #[arg(long)]
    no_upper: bool,
    /// Leave out lower-case letters
    #[arg(long)]
    no_lower: bool,
    /// Leave out digits
    #[arg(long)]
    no_digits: bool,
    /// Leave out special characters
    #[arg(long)]
    no_special: bool,
    #[arg(long)]
    brackets: bool,
    #[arg(long)]
    space: bool,
    #[arg(long)]
    minus: bool,
    #[arg(long)]
    underline: bool,
    /// Include Latin-1 letters
    #[arg(long)]
    latin1: bool,
    /// Extra characters to draw from
    #[arg(long, default_value = "")]
    custom: String,
}

impl GenerateArgs {
    fn options(&self) -> GeneratorOptions {
        GeneratorOptions {
            length: self.length,
            upper_case: !self.no_upper,
            lower_case: !self.no_lower,
            digits: !self.no_digits,
            special: !self.no_special,
            brackets: self.brackets,
            space: self.space,
            minus: self.minus,
            underline: self.underline,
            latin1: self.latin1,
            custom: self.custom.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("vigil_cli=info".parse()?)
                .add_directive("vigil_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Generating needs neither config nor database
    if let Command::Generate(generate) = &args.command {
        return commands::generate(&generate.options());
    }

    let mut config = Config::load(args.config)?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Ok(key) = std::env::var("VIGIL_HIBP_API_KEY") {
        config.hibp_api_key = Some(key);
    }

    tracing::info!("Using database {}", config.database_path.display());

    let password = read_master_password()?;
    let mut session = commands::Session::open(&config, &password)?;

    match args.command {
        Command::Tree { ids } => commands::print_tree(&session, ids),
        Command::Search { query, limit } => commands::search(&session, &query, limit),
        Command::Scan { emails } => commands::scan(&session, emails).await?,
        Command::Report => commands::report(&session)?,
        Command::ClearCache { all } => commands::clear_cache(&session, all)?,
        Command::AddGroup { parent, name } => session.edit("add group", |root| {
            let parent = commands::resolve_group_id(root, &parent);
            vigil_core::tree::add_group(root, &parent, &name)
        })?,
        Command::RenameGroup { group, name } => session.edit("rename group", |root| {
            vigil_core::tree::rename_group(root, &group, &name)
        })?,
        Command::MoveGroup { group, parent } => session.edit("move group", |root| {
            let parent = commands::resolve_group_id(root, &parent);
            vigil_core::tree::move_group(root, &group, &parent)
        })?,
        Command::MoveEntry { entry, group } => session.edit("move entry", |root| {
            let group = commands::resolve_group_id(root, &group);
            vigil_core::tree::move_entry(root, &entry, &group)
        })?,
        Command::RemoveGroup { group } => session.edit("remove group", |root| {
            vigil_core::tree::remove_group(root, &group)
        })?,
        Command::RemoveEntry { entry } => session.edit("remove entry", |root| {
            vigil_core::tree::remove_entry(root, &entry)
        })?,
        Command::ImportCsv { path } => commands::import_csv(&mut session, &path)?,
        Command::SetPassword { entry, length } => commands::set_password(&mut session, &entry, length)?,
        Command::Generate(generate) => commands::generate(&generate.options())?,
    }

    Ok(())
}

/// Master password from `VIGIL_PASSWORD`, or an interactive prompt.
fn read_master_password() -> Result<String> {
    if let Ok(password) = std::env::var("VIGIL_PASSWORD") {
        return Ok(password);
    }
    rpassword::prompt_password("Master password: ").context("Failed to read master password")
}
