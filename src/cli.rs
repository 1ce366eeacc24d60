//! Command line interface for the `hl7-mllp-sender` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{OutputFormat, Scenario, TransportSettings};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::transport::DEFAULT_RESPONSE_BYTE_LIMIT;

/// Generate synthetic HL7 v2 messages and deliver them over MLLP.
#[derive(Debug, Parser)]
#[command(name = "hl7-mllp-sender", version, about)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one payload, read from a file or stdin
    Send(SendArgs),
    /// Generate messages from a template and send them
    Run(RunArgs),
    /// Print generated messages without sending them
    Generate(GenerateArgs),
    /// Accept MLLP connections and acknowledge every message
    Listen(ListenArgs),
    /// List the built-in templates
    Templates,
}

#[derive(Debug, Args)]
pub struct NetworkArgs {
    /// Seconds allowed for each of connect, write and read; 0 waits forever
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Largest reply captured from each endpoint, in bytes
    #[arg(long, default_value_t = DEFAULT_RESPONSE_BYTE_LIMIT)]
    pub response_limit: usize,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Destination as host:port or a bare port on 127.0.0.1; repeatable
    #[arg(short, long = "target", required = true)]
    pub targets: Vec<Endpoint>,

    /// File holding the ER7 message; stdin when omitted
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub network: NetworkArgs,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scenario file; command line options override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Built-in template name or path to a template file
    #[arg(long)]
    pub template: Option<String>,

    /// Destination as host:port or a bare port; repeatable
    #[arg(short, long = "target")]
    pub targets: Vec<Endpoint>,

    /// Number of messages to generate
    #[arg(short = 'n', long)]
    pub count: Option<u32>,

    /// Pause between messages, in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// CSV file backing column value sources
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Also write every sent message to this folder
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// File format for saved messages
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Seed for reproducible random values
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seconds allowed for each of connect, write and read; 0 waits forever
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Largest reply captured from each endpoint, in bytes
    #[arg(long)]
    pub response_limit: Option<usize>,
}

impl RunArgs {
    /// Loads the scenario file, if any, and layers the options on top.
    pub fn scenario(&self) -> Result<Scenario> {
        let mut scenario = match &self.config {
            Some(path) => Scenario::from_path(path)?,
            None => Scenario::default(),
        };

        if let Some(template) = &self.template {
            scenario.template = template.clone();
        }
        if !self.targets.is_empty() {
            scenario.targets = self.targets.clone();
        }
        if let Some(count) = self.count {
            scenario.count = count;
        }
        if let Some(interval_ms) = self.interval_ms {
            scenario.interval_ms = interval_ms;
        }
        if self.dataset.is_some() {
            scenario.dataset = self.dataset.clone();
        }
        if self.output_dir.is_some() {
            scenario.output_dir = self.output_dir.clone();
        }
        if let Some(format) = self.format {
            scenario.output_format = format;
        }
        if self.seed.is_some() {
            scenario.seed = self.seed;
        }
        if let Some(secs) = self.timeout_secs {
            let limit = self
                .response_limit
                .unwrap_or(scenario.transport.response_byte_limit);
            scenario.transport = TransportSettings::uniform(secs, limit);
        } else if let Some(limit) = self.response_limit {
            scenario.transport.response_byte_limit = limit;
        }
        Ok(scenario)
    }
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Built-in template name or path to a template file
    #[arg(long, default_value = crate::config::DEFAULT_TEMPLATE)]
    pub template: String,

    /// Number of messages to generate
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: u32,

    /// CSV file backing column value sources
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Seed for reproducible random values
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write each message to this folder instead of stdout
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// File format used with --output-dir
    #[arg(long, value_enum, default_value_t = OutputFormat::Er7)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Address to accept connections on
    #[arg(short, long, default_value = "127.0.0.1:2575")]
    pub bind: String,

    /// Reply sent (MLLP framed) for every message; a single ACK byte by default
    #[arg(long)]
    pub ack: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_targets() {
        let cli = Cli::parse_from([
            "hl7-mllp-sender",
            "send",
            "-t",
            "2575",
            "--target",
            "10.0.0.5:2576",
            "--timeout-secs",
            "5",
        ]);
        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.targets, vec![Endpoint::local(2575), Endpoint::new("10.0.0.5", 2576)]);
                assert_eq!(args.network.timeout_secs, 5);
                assert_eq!(args.network.response_limit, DEFAULT_RESPONSE_BYTE_LIMIT);
                assert!(args.file.is_none());
            }
            other => panic!("expected send, got {:?}", other),
        }
    }

    #[test]
    fn send_requires_a_target() {
        assert!(Cli::try_parse_from(["hl7-mllp-sender", "send"]).is_err());
    }

    #[test]
    fn run_options_override_defaults() {
        let cli = Cli::parse_from([
            "hl7-mllp-sender",
            "--log-level",
            "debug",
            "run",
            "--template",
            "adt-a08",
            "-t",
            "2577",
            "-n",
            "3",
            "--interval-ms",
            "1000",
            "--timeout-secs",
            "0",
        ]);
        assert_eq!(cli.log_level, "debug");

        let args = match cli.command {
            Command::Run(args) => args,
            other => panic!("expected run, got {:?}", other),
        };
        let scenario = args.scenario().expect("scenario");
        assert_eq!(scenario.template, "adt-a08");
        assert_eq!(scenario.targets, vec![Endpoint::local(2577)]);
        assert_eq!(scenario.count, 3);
        assert_eq!(scenario.interval_ms, 1000);
        assert_eq!(scenario.transport.to_config().read_timeout, None);
    }

    #[test]
    fn output_format_is_selectable() {
        let cli = Cli::parse_from(["hl7-mllp-sender", "generate", "--output-dir", "out", "--format", "json"]);
        match cli.command {
            Command::Generate(args) => assert_eq!(args.format, OutputFormat::Json),
            other => panic!("expected generate, got {:?}", other),
        }

        let cli = Cli::parse_from(["hl7-mllp-sender", "run", "-t", "2575", "--format", "json"]);
        let args = match cli.command {
            Command::Run(args) => args,
            other => panic!("expected run, got {:?}", other),
        };
        assert_eq!(args.scenario().expect("scenario").output_format, OutputFormat::Json);

        assert!(Cli::try_parse_from(["hl7-mllp-sender", "generate", "--format", "xml"]).is_err());
    }

    #[test]
    fn rejects_malformed_target() {
        assert!(Cli::try_parse_from(["hl7-mllp-sender", "send", "-t", "nowhere"]).is_err());
    }
}
