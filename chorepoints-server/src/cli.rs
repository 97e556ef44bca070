use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)

Command-line flags take precedence over the environment.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "chorepoints-server",
    version,
    about = "Chore points household server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Path to the SQLite database
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Listen port; overrides PORT and config.listen_port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Compare every child's cached balance with its ledger and report drift
    Audit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audit_with_global_db() {
        let cli = Cli::parse_from(["chorepoints-server", "audit", "--db", "/tmp/x.db"]);
        assert!(matches!(cli.command, Some(Command::Audit)));
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["chorepoints-server"]);
        assert!(cli.command.is_none());
    }
}
