use std::path::PathBuf;

use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $CHOREPOINTS_CONFIG
  3) platform default, e.g. ~/.config/chorepoints/client.yaml
"#;

#[derive(Debug, Parser)]
#[command(
    name = "chorepoints-client",
    version,
    about = "Household chores and points, from the terminal",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Optional subcommand. Without one, prints the household summary.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save the server URL to the config file
    SetServer {
        /// e.g. http://192.168.1.10:5151
        url: String,
        /// IANA timezone of the household
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Balances, tasks waiting for approval and open redemptions
    Summary,
    /// A child's point history, newest first
    Ledger {
        /// Child id or name
        child: String,
        /// Show per-day totals instead of single entries
        #[arg(long)]
        daily: bool,
    },
    /// Submit a task as done
    Done {
        task: String,
        /// Photo proof (data URL or link)
        #[arg(long)]
        photo: Option<String>,
    },
    /// Spend points on a reward
    Redeem {
        reward: String,
        /// Child id or name
        child: String,
    },
    /// Approve a submitted task (parent)
    Approve {
        task: String,
        #[arg(long)]
        pin: String,
    },
    /// Reject a submitted task (parent)
    Reject {
        task: String,
        #[arg(long)]
        pin: String,
    },
    /// Take points away from a child (parent)
    Deduct {
        /// Child id or name
        child: String,
        amount: i64,
        #[arg(long, default_value = "")]
        reason: String,
        #[arg(long)]
        pin: String,
    },
    /// Stay connected and log changes as they arrive
    Watch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parent_command() {
        let cli = Cli::parse_from([
            "chorepoints-client",
            "deduct",
            "Alice",
            "5",
            "--reason",
            "rude",
            "--pin",
            "1234",
            "-c",
            "/tmp/c.yaml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        match cli.command {
            Some(Command::Deduct {
                child, amount, pin, ..
            }) => {
                assert_eq!((child.as_str(), amount, pin.as_str()), ("Alice", 5, "1234"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_means_summary() {
        let cli = Cli::parse_from(["chorepoints-client"]);
        assert!(cli.command.is_none());
    }
}
