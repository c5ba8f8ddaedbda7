//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Halldyll infra - session-scoped infrastructure provisioning.
#[derive(Parser, Debug)]
#[command(name = "halldyll-infra")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Directory holding one working directory per session.
    #[arg(long, global = true, env = "HALLDYLL_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Provisioning tool to run.
    #[arg(long, global = true, env = "HALLDYLL_TOOL")]
    pub tool: Option<String>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "HALLDYLL_LISTEN")]
        listen: Option<String>,
    },

    /// Render a descriptor into configuration text.
    Render {
        /// Descriptor file (.json, .yaml or .yml).
        descriptor: PathBuf,

        /// Write the configuration here instead of standard output.
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },

    /// Validate a descriptor.
    Validate {
        /// Descriptor file (.json, .yaml or .yml).
        descriptor: PathBuf,
    },

    /// Write the configuration and initialize a session's working directory.
    Init {
        /// Session selection.
        #[command(flatten)]
        session: SessionArgs,

        /// Region to provision into.
        #[arg(short, long)]
        region: String,

        /// Descriptor to render instead of the baseline configuration.
        #[arg(short, long)]
        descriptor: Option<PathBuf>,
    },

    /// Compute and save a plan.
    Plan {
        /// Session selection.
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Apply the saved plan.
    Apply {
        /// Session selection.
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Tear down everything the session applied.
    Destroy {
        /// Session selection.
        #[command(flatten)]
        session: SessionArgs,
    },
}

/// Selects the session a lifecycle command acts on.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Session identifier (also the working directory name).
    #[arg(short, long = "session")]
    pub id: String,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per log line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_lifecycle_command() {
        let cli = Cli::try_parse_from([
            "halldyll-infra",
            "--output",
            "json",
            "init",
            "--session",
            "s1",
            "--region",
            "eu-west-1",
        ])
        .unwrap();

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Init { session, region, descriptor } => {
                assert_eq!(session.id, "s1");
                assert_eq!(region, "eu-west-1");
                assert!(descriptor.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_render_with_out() {
        let cli = Cli::try_parse_from(["halldyll-infra", "render", "app.yaml", "--out", "main.tf"])
            .unwrap();
        match cli.command {
            Commands::Render { descriptor, out } => {
                assert_eq!(descriptor, PathBuf::from("app.yaml"));
                assert_eq!(out, Some(PathBuf::from("main.tf")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
