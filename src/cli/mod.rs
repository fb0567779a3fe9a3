//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "nvk-rag",
    version,
    author = "neur0map",
    about = "Hybrid dense + lexical retrieval over a continuously growing corpus",
    long_about = "nvk-rag indexes documents into an exact and an approximate vector index plus a \
                  BM25 keyword index, and answers queries by merging dense and lexical results. \
                  The index is persisted after every committed ingestion."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/nvk-rag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a single document
    Ingest {
        /// Document text (omit when using --file)
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        /// Read the document text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Query the index
    Query {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Dense-only search against the exact index
        #[arg(long)]
        dense_only: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Load every matching file in a directory
    Load {
        /// Directory to walk
        dir: PathBuf,

        /// File extensions to include (repeatable, defaults to config)
        #[arg(short, long = "ext")]
        extensions: Vec<String>,
    },

    /// Watch an inbox directory for JSON documents until Ctrl-C
    Watch {
        /// Inbox directory (defaults to config)
        #[arg(short, long)]
        inbox: Option<PathBuf>,
    },

    /// Show index statistics
    Stats {
        /// Show statistics in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_flags() {
        let cli = Cli::try_parse_from(["nvk-rag", "query", "tls handshake", "-k", "3", "--dense-only"])
            .unwrap();
        match cli.command {
            Commands::Query {
                query,
                limit,
                dense_only,
                json,
            } => {
                assert_eq!(query, "tls handshake");
                assert_eq!(limit, Some(3));
                assert!(dense_only);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ingest_needs_text_or_file() {
        assert!(Cli::try_parse_from(["nvk-rag", "ingest"]).is_err());
        assert!(Cli::try_parse_from(["nvk-rag", "ingest", "hello"]).is_ok());
        assert!(Cli::try_parse_from(["nvk-rag", "ingest", "--file", "a.txt"]).is_ok());
    }

    #[test]
    fn test_load_extensions() {
        let cli =
            Cli::try_parse_from(["nvk-rag", "load", "docs", "--ext", "md", "--ext", "txt"]).unwrap();
        match cli.command {
            Commands::Load { dir, extensions } => {
                assert_eq!(dir, PathBuf::from("docs"));
                assert_eq!(extensions, vec!["md", "txt"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
