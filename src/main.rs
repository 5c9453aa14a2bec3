use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use easiermongo::ConnectionStringBuilder;
use easiermongo::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ConnectionArgs {
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    db_name: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    /// Use the mongodb+srv scheme
    #[arg(long)]
    srv: bool,
    #[arg(long)]
    auth_source: Option<String>,
}

impl From<ConnectionArgs> for ConnectionStringBuilder {
    fn from(args: ConnectionArgs) -> Self {
        ConnectionStringBuilder {
            host: Some(args.host),
            port: args.port,
            db_name: args.db_name,
            username: args.username,
            password: args.password,
            srv: args.srv,
            auth_source: args.auth_source,
        }
    }
}

impl From<Commands> for easiermongo::AppCommand {
    fn from(cmd: Commands) -> easiermongo::AppCommand {
        match cmd {
            Commands::Schemas { dir } => easiermongo::AppCommand::Schemas { dir },
            Commands::ConnectionString(args) => {
                easiermongo::AppCommand::ConnectionString(args.into())
            }
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display the schemas found in the schema folder
    Schemas {
        /// Folder to read instead of `schema_folder_path`
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Print a connection string
    ConnectionString(ConnectionArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => easiermongo::cli::setup::setup(),
        Some(cmd) => easiermongo::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
