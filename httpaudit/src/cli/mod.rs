//! CLI module for httpaudit
//!
//! Provides command-line interface for the audit server.

/// serve サブコマンド
pub mod serve;
/// stats サブコマンド
pub mod stats;

use clap::{Parser, Subcommand};

/// httpaudit - HTTP traffic audit capture server
#[derive(Parser, Debug)]
#[command(name = "httpaudit")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    HTTPAUDIT_HOST                     Bind address (default: 0.0.0.0)
    HTTPAUDIT_PORT                     Listen port (default: 8080)
    HTTPAUDIT_DATABASE_URL             Database URL (default: sqlite:~/.httpaudit/audit.db)
    HTTPAUDIT_LOG_LEVEL                Log level (default: info)
    HTTPAUDIT_LOG_DIR                  Write daily rolling log files to this directory
    HTTPAUDIT_API_PREFIX               Captured path prefix (default: /api/)
    HTTPAUDIT_EXCLUDED_PREFIX          Audit query prefix, never captured (default: /api/audit)
    HTTPAUDIT_RESPONSE_TRUNCATE_CHARS  Stored snapshot cap in characters (default: 5000)
    HTTPAUDIT_MAX_BUFFERED_BODY_BYTES  Replay buffer limit (default: 10485760)
    HTTPAUDIT_RECORDER_QUEUE_CAPACITY  Pending record queue size (default: 10000)
    HTTPAUDIT_CORS_ORIGINS             Comma-separated allowed origins (default: any)
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the audit server
    Serve(serve::ServeArgs),
    /// Print request statistics from the audit database
    Stats(stats::StatsArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_flags() {
        let cli = Cli::try_parse_from(["httpaudit", "serve", "-p", "9000", "-H", "127.0.0.1"])
            .unwrap();
        match cli.command {
            Some(Commands::Serve(args)) => {
                assert_eq!(args.port, 9000);
                assert_eq!(args.host, "127.0.0.1");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_stats() {
        let cli = Cli::try_parse_from(["httpaudit", "stats", "--hours", "6", "--json"]).unwrap();
        match cli.command {
            Some(Commands::Stats(args)) => {
                assert_eq!(args.hours, 6);
                assert!(args.json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["httpaudit"]).unwrap();
        assert!(cli.command.is_none());
    }
}
