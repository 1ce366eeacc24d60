//! Scenario files: what to generate, where to send it, and how fast.
//!
//! ```toml
//! template = "orm-o01"
//! targets = ["127.0.0.1:2575", 2576]
//! count = 2
//! interval_ms = 2000
//! dataset = "obr5_values.csv"
//! output_dir = "output_messages"
//! output_format = "er7"
//!
//! [updates]
//! field = "ORC-5"
//! values = ["SC", "IP", "HD", "CM", "CA"]
//! count = 4
//!
//! [transport]
//! read_timeout_secs = 10
//! ```
//!
//! More templates can follow the first one, sharing the same session so
//! sequence numbers continue and captured values carry over:
//!
//! ```toml
//! template = "adt-a08"
//! count = 3
//!
//! [[then]]
//! template = "adt-a43"
//! count = 3
//! ```
//!
//! Relative paths are resolved against the scenario file's directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::message::FieldRef;
use crate::transport::{TransportConfig, DEFAULT_RESPONSE_BYTE_LIMIT, DEFAULT_TIMEOUT};

pub const DEFAULT_TEMPLATE: &str = "orm-o01";

/// A complete generate-and-send run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Built-in template name or path to a template file.
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default)]
    pub targets: Vec<Endpoint>,
    #[serde(default = "default_count")]
    pub count: u32,
    /// Pause between generated messages.
    #[serde(default)]
    pub interval_ms: u64,
    /// Sequence number of the first message.
    #[serde(default = "default_first_sequence")]
    pub first_sequence: u32,
    /// Fixes the random values for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
    /// CSV file backing `column` value sources.
    #[serde(default)]
    pub dataset: Option<PathBuf>,
    /// Every sent message is also written here.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub updates: Option<UpdatePlan>,
    /// Templates generated after `template`, in order.
    #[serde(default)]
    pub then: Vec<Phase>,
    #[serde(default)]
    pub transport: TransportSettings,
}

/// How saved messages are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The raw ER7 payload, as sent.
    #[default]
    Er7,
    /// A `{"name", "content", "type"}` document with newline segment breaks.
    Json,
}

/// A follow-on batch of messages from another template.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Phase {
    pub template: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

/// Re-sends each generated message with one field rotated through `values`,
/// e.g. to walk an order through its status changes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePlan {
    pub field: FieldRef,
    pub values: Vec<String>,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub interval_ms: u64,
}

/// Network bounds. A timeout of 0 waits indefinitely.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSettings {
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_response_byte_limit")]
    pub response_byte_limit: usize,
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_count() -> u32 {
    1
}

fn default_first_sequence() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_response_byte_limit() -> usize {
    DEFAULT_RESPONSE_BYTE_LIMIT
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            connect_timeout_secs: default_timeout_secs(),
            write_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
            response_byte_limit: default_response_byte_limit(),
        }
    }
}

fn bound(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

impl TransportSettings {
    /// Same bound for every stage.
    pub fn uniform(timeout_secs: u64, response_byte_limit: usize) -> Self {
        TransportSettings {
            connect_timeout_secs: timeout_secs,
            write_timeout_secs: timeout_secs,
            read_timeout_secs: timeout_secs,
            response_byte_limit,
        }
    }

    pub fn to_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: bound(self.connect_timeout_secs),
            write_timeout: bound(self.write_timeout_secs),
            read_timeout: bound(self.read_timeout_secs),
            response_byte_limit: self.response_byte_limit,
        }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            template: default_template(),
            targets: Vec::new(),
            count: default_count(),
            interval_ms: 0,
            first_sequence: default_first_sequence(),
            seed: None,
            dataset: None,
            output_dir: None,
            output_format: OutputFormat::default(),
            updates: None,
            then: Vec::new(),
            transport: TransportSettings::default(),
        }
    }
}

fn resolve_template_path(base: &Path, template: &str) -> String {
    let path = base.join(template);
    if path.is_file() {
        path.to_string_lossy().into_owned()
    } else {
        template.to_string()
    }
}

impl Scenario {
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| Error::Config {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Loads a scenario file, resolving its relative paths against the file's
    /// own directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut scenario = Self::from_toml_str(&text, path)?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        scenario.dataset = scenario.dataset.map(|p| base.join(p));
        scenario.output_dir = scenario.output_dir.map(|p| base.join(p));
        scenario.template = resolve_template_path(base, &scenario.template);
        for phase in &mut scenario.then {
            phase.template = resolve_template_path(base, &phase.template);
        }
        Ok(scenario)
    }

    /// `(template, count)` for the first batch and every `then` batch.
    pub fn phases(&self) -> Vec<(&str, u32)> {
        std::iter::once((self.template.as_str(), self.count))
            .chain(self.then.iter().map(|p| (p.template.as_str(), p.count)))
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Checks what can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::NoEndpoints);
        }
        if let Some(updates) = &self.updates {
            if updates.values.is_empty() {
                return Err(Error::EmptyPool(format!("updates to {}", updates.field)));
            }
        }
        Ok(())
    }
}
