//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "hanging-protocols",
    version,
    about = "Select hanging protocols and bind studies to viewports",
    long_about = "Evaluate hanging protocols against a patient's studies.\n\n\
                  Ranks the protocols, activates the best match and prints the\n\
                  study, series and image bound to each viewport."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow patient identifiers and attribute values in log output.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Rank protocols for a study set and print the viewport bindings.
    Match(MatchArgs),

    /// List the protocols of a protocol document.
    Protocols(ProtocolsArgs),

    /// Report rules and stages that cannot work as written.
    Check(ProtocolsArgs),
}

#[derive(Parser)]
pub struct MatchArgs {
    /// Protocol document (JSON).
    #[arg(long = "protocols", value_name = "FILE")]
    pub protocols: PathBuf,

    /// Study set with the current study and its priors (JSON).
    #[arg(long = "studies", value_name = "FILE")]
    pub studies: PathBuf,

    /// Engine configuration (TOML). Defaults apply when omitted.
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stage to display after selection (0-based).
    #[arg(long = "stage", value_name = "N", default_value_t = 0)]
    pub stage: usize,

    /// Print the result as JSON instead of tables.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Parser)]
pub struct ProtocolsArgs {
    /// Protocol document (JSON).
    #[arg(long = "protocols", value_name = "FILE")]
    pub protocols: PathBuf,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
