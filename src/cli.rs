use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// crawlcore cli
#[derive(Parser)]
#[command(name = "crawlcore")]
#[command(about = "Resumable document collector built on the crawlcore engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args)]
pub struct ConfigArgs {
    /// Path to the crawler configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// Path to an optional `name = value` variables file
    #[arg(long = "variables", value_name = "FILE")]
    pub variables: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start (or resume) the crawl
    Start {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Ask a running crawl to stop gracefully
    Stop {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Remove everything the crawler persisted
    Clean {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Validate the configuration and exit
    Configcheck {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Export the reference store to a JSONL file
    Storeexport {
        #[command(flatten)]
        config: ConfigArgs,

        /// Directory the export file is written to
        #[arg(short = 'o', long = "output", value_name = "DIR", default_value = ".")]
        output: PathBuf,
    },

    /// Import a previously exported reference store
    Storeimport {
        #[command(flatten)]
        config: ConfigArgs,

        /// Export file to read
        #[arg(short = 'i', long = "input", value_name = "FILE")]
        input: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
