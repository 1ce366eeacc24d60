//! Generate, save, send, pace: the loop behind `run`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use log::{debug, info, warn};
use serde::Serialize;

use crate::builtin;
use crate::config::{OutputFormat, Scenario, UpdatePlan};
use crate::dataset::Dataset;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::session::Session;
use crate::template::Template;
use crate::transport::{DeliveryResult, Transport};

/// Totals for a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Distinct messages generated from the template.
    pub generated: u32,
    /// Payloads handed to the transport, update re-sends included.
    pub sent: u32,
    /// Successful endpoint deliveries.
    pub delivered: u32,
    /// Failed endpoint deliveries.
    pub failed: u32,
}

impl RunSummary {
    fn record(&mut self, results: &[DeliveryResult]) {
        self.sent += 1;
        for result in results {
            if result.is_success() {
                self.delivered += 1;
            } else {
                self.failed += 1;
            }
        }
    }
}

/// Logs one line per endpoint: the reply on success, the cause on failure.
pub fn report(results: &[DeliveryResult]) {
    for result in results {
        match &result.outcome {
            Ok(response) => info!("Received from {}: {}", result.endpoint, response.text().escape_debug()),
            Err(e) => warn!("Failed to send message to {}: {}", result.endpoint, e),
        }
    }
}

/// Drives a [`Scenario`] to completion, one message at a time.
pub struct Runner {
    phases: Vec<(Template, u32)>,
    session: Session,
    transport: Transport,
    targets: Vec<Endpoint>,
    interval: Duration,
    updates: Option<UpdatePlan>,
    output_dir: Option<PathBuf>,
    output_format: OutputFormat,
}

impl Runner {
    /// Resolves the templates, loads the dataset and checks the update plan
    /// against the templates before anything is sent.
    pub fn new(scenario: Scenario) -> Result<Self> {
        scenario.validate()?;
        let phases = scenario
            .phases()
            .into_iter()
            .map(|(template, count)| Ok((builtin::resolve(template)?, count)))
            .collect::<Result<Vec<_>>>()?;

        let session = match scenario.seed {
            Some(seed) => Session::seeded(seed),
            None => Session::new(),
        };
        let mut session = session.starting_at(scenario.first_sequence);
        if let Some(path) = &scenario.dataset {
            session = session.with_dataset(Dataset::from_path(path)?);
        }

        if let Some(updates) = &scenario.updates {
            let segment = &updates.field.segment;
            if !phases.iter().any(|(t, _)| t.segments.iter().any(|s| &s.id == segment)) {
                return Err(Error::InvalidField(format!(
                    "{} (no template in the scenario has a {} segment)",
                    updates.field, segment
                )));
            }
        }

        let interval = scenario.interval();
        Ok(Runner {
            phases,
            session,
            transport: Transport::new(scenario.transport.to_config()),
            targets: scenario.targets,
            interval,
            updates: scenario.updates,
            output_dir: scenario.output_dir,
            output_format: scenario.output_format,
        })
    }

    /// Templates in the order they run, with their message counts.
    pub fn phases(&self) -> &[(Template, u32)] {
        &self.phases
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let phases = std::mem::take(&mut self.phases);
        let result = self.run_phases(&phases, &mut summary).await;
        self.phases = phases;
        result?;

        info!(
            "Done: {} generated, {} sent, {} delivered, {} failed",
            summary.generated, summary.sent, summary.delivered, summary.failed
        );
        Ok(summary)
    }

    async fn run_phases(&mut self, phases: &[(Template, u32)], summary: &mut RunSummary) -> Result<()> {
        for (template, count) in phases {
            info!(
                "Sending {} '{}' message(s) to {} target(s)",
                count,
                template.name,
                self.targets.len()
            );
            for _ in 0..*count {
                if summary.generated > 0 {
                    pause(self.interval).await;
                }
                let message = self.session.generate(template)?;
                summary.generated += 1;
                self.deliver_with_updates(message, summary).await?;
            }
        }
        Ok(())
    }

    async fn deliver_with_updates(&mut self, mut message: Message, summary: &mut RunSummary) -> Result<()> {
        let sequence = self.session.sequence();
        self.deliver(&message, sequence, None, summary).await?;

        let updates = match self.updates.clone() {
            Some(updates) => updates,
            None => return Ok(()),
        };
        let field = &updates.field;
        // only messages from templates carrying the segment get updates
        if !message.segments().iter().any(|s| s.id() == field.segment) {
            return Ok(());
        }

        // carry on from the value the message was generated with
        let key = format!("update/{}", field);
        self.session
            .resume_cycle(&key, &updates.values, message.get(&field.segment, field.field));
        for update in 1..=updates.count {
            pause(Duration::from_millis(updates.interval_ms)).await;
            let value = self.session.next_in_cycle(&key, &updates.values)?;
            debug!("Update {} of #{}: {} = {}", update, sequence, field, value);
            message.set(&field.segment, field.field, value);
            self.deliver(&message, sequence, Some(update), summary).await?;
        }
        Ok(())
    }

    async fn deliver(
        &self,
        message: &Message,
        sequence: u32,
        update: Option<u32>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let payload = message.render();
        if let Some(dir) = &self.output_dir {
            let path = save_message(dir, &payload, sequence, update, self.output_format)?;
            debug!("Saved {}", path.display());
        }

        let results = self.transport.send(&payload, &self.targets).await?;
        report(&results);
        summary.record(&results);
        Ok(())
    }
}

async fn pause(interval: Duration) {
    if !interval.is_zero() {
        tokio::time::sleep(interval).await;
    }
}

/// A saved message in the JSON layout integration engines import.
#[derive(Debug, Serialize)]
pub struct JsonMessage {
    pub name: String,
    /// The ER7 text with `\n` segment breaks and a trailing newline.
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl JsonMessage {
    pub fn new(payload: &str, sequence: u32) -> Self {
        let mut content = payload.replace('\r', "\n");
        content.push('\n');
        JsonMessage {
            name: format!("name{}.{}", sequence, message_code(payload)),
            content,
            kind: "HL7".to_string(),
        }
    }

    /// Pretty printed with four space indentation.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }
}

/// First component of MSH-9 (`ORM`, `ADT`), or `HL7` if there isn't one.
fn message_code(payload: &str) -> &str {
    payload
        .split('\r')
        .next()
        .and_then(|msh| msh.split('|').nth(8))
        .and_then(|kind| kind.split('^').next())
        .filter(|code| !code.is_empty())
        .unwrap_or("HL7")
}

/// Writes `payload` to `dir`: as `message_<timestamp>_<seq>[_u<n>].hl7` for
/// ER7, or `hl7_message_<seq>[_u<n>].json` for JSON.
pub fn save_message(
    dir: &Path,
    payload: &str,
    sequence: u32,
    update: Option<u32>,
    format: OutputFormat,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let suffix = update.map(|n| format!("_u{}", n)).unwrap_or_default();
    let (name, contents) = match format {
        OutputFormat::Er7 => {
            let stamp = Local::now().format("%Y%m%d%H%M%S");
            (
                format!("message_{}_{:04}{}.hl7", stamp, sequence, suffix),
                payload.as_bytes().to_vec(),
            )
        }
        OutputFormat::Json => (
            format!("hl7_message_{}{}.json", sequence, suffix),
            JsonMessage::new(payload, sequence).to_json()?,
        ),
    };
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}
