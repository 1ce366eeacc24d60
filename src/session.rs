//! Evaluation of templates into messages.

use std::collections::{BTreeMap, HashMap};

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use log::trace;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::template::{Template, ValueSource};

/// Per-run generation state.
///
/// A session owns the message sequence number, the position of every cycling
/// value pool, the random number generator, the optional CSV dataset and the
/// values captured from earlier messages (see [`Template::captures`]).
/// Rotation is keyed by where a pool sits in its template, so two templates
/// (or two fields) cycling over the same values advance independently.
#[derive(Debug)]
pub struct Session {
    sequence: u32,
    positions: HashMap<String, usize>,
    rng: StdRng,
    dataset: Option<Dataset>,
    captured: HashMap<String, Vec<String>>,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session::with_rng(StdRng::from_entropy())
    }

    /// A session whose random values repeat from run to run.
    pub fn seeded(seed: u64) -> Self {
        Session::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Session {
            sequence: 0,
            positions: HashMap::new(),
            rng,
            dataset: None,
            captured: HashMap::new(),
        }
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// The next generated message gets sequence number `first`.
    pub fn starting_at(mut self, first: u32) -> Self {
        self.sequence = first.saturating_sub(1);
        self
    }

    /// Sequence number of the most recently generated message, 0 before any.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// Values captured so far into `pool`, oldest first.
    pub fn captured(&self, pool: &str) -> &[String] {
        self.captured.get(pool).map(Vec::as_slice).unwrap_or_default()
    }

    /// Builds the next message from `template`.
    pub fn generate(&mut self, template: &Template) -> Result<Message> {
        self.sequence = self.sequence.checked_add(1).ok_or(Error::SequenceExhausted)?;
        trace!("Generating '{}' #{}", template.name, self.sequence);

        let mut vars = BTreeMap::new();
        for (name, source) in &template.vars {
            let key = format!("{}/${}", template.name, name);
            let value = self.evaluate(source, &key, &vars)?;
            vars.insert(name.clone(), value);
        }

        let mut message = Message::new();
        for (index, segment_template) in template.segments.iter().enumerate() {
            let segment = message.segment(segment_template.id.clone());
            for (field, source) in &segment_template.fields {
                let key = format!("{}/{}:{}-{}", template.name, index, segment_template.id, field);
                let value = self.evaluate(source, &key, &vars)?;
                segment.set(*field, value);
            }
        }

        for (pool, field) in &template.captures {
            if let Some(value) = message.get(&field.segment, field.field) {
                trace!("Captured {} = {} into '{}'", field, value, pool);
                self.captured.entry(pool.clone()).or_default().push(value.to_string());
            }
        }
        Ok(message)
    }

    /// Returns the value at this pool's position and advances it, wrapping.
    pub fn next_in_cycle(&mut self, key: &str, values: &[String]) -> Result<String> {
        let index = advance(&mut self.positions, key, values.len())?;
        Ok(values[index].clone())
    }

    /// Positions the pool at `key` just after `current`, so the next value
    /// handed out is the one following it. Starts from the top if `current`
    /// isn't one of `values`.
    pub fn resume_cycle(&mut self, key: &str, values: &[String], current: Option<&str>) {
        let next = current
            .and_then(|current| values.iter().position(|v| v == current))
            .map_or(0, |i| (i + 1) % values.len().max(1));
        self.positions.insert(key.to_string(), next);
    }

    fn evaluate(&mut self, source: &ValueSource, key: &str, vars: &BTreeMap<String, String>) -> Result<String> {
        match source {
            ValueSource::Static(text) => Ok(text.clone()),
            ValueSource::Cycle(values) => self.next_in_cycle(key, values),
            ValueSource::Choice(values) => values
                .choose(&mut self.rng)
                .cloned()
                .ok_or_else(|| Error::EmptyPool(key.to_string())),
            ValueSource::Digits(len) => Ok((0..*len)
                .map(|_| char::from(b'0' + self.rng.gen_range(0..10u8)))
                .collect()),
            ValueSource::Number { min, max } => {
                if min > max {
                    return Err(Error::InvalidRange {
                        field: key.to_string(),
                        min: *min,
                        max: *max,
                    });
                }
                Ok(self.rng.gen_range(*min..=*max).to_string())
            }
            ValueSource::Timestamp(format) => timestamp(format),
            ValueSource::Sequence { prefix, width, suffix } => Ok(format!(
                "{}{:0width$}{}",
                prefix,
                self.sequence,
                suffix,
                width = *width
            )),
            ValueSource::Column { name, fallback } => {
                if let Some(dataset) = self.dataset.as_ref().filter(|d| d.has_column(name)) {
                    let values = dataset.column(name)?;
                    let index = advance(&mut self.positions, key, values.len())?;
                    return Ok(values[index].clone());
                }
                match fallback {
                    Some(fallback) => self.evaluate(fallback, key, vars),
                    None if self.dataset.is_some() => Err(Error::MissingColumn(name.clone())),
                    None => Err(Error::MissingDataset(name.clone())),
                }
            }
            ValueSource::Captured { pool, fallback } => {
                if let Some(values) = self.captured.get(pool).filter(|v| !v.is_empty()) {
                    let index = advance(&mut self.positions, key, values.len())?;
                    return Ok(values[index].clone());
                }
                match fallback {
                    Some(fallback) => self.evaluate(fallback, key, vars),
                    None => Err(Error::EmptyPool(format!("captured '{}'", pool))),
                }
            }
            ValueSource::Fake(kind) => Ok(kind.generate(&mut self.rng)),
            ValueSource::Var(name) => vars
                .get(name)
                .cloned()
                .ok_or_else(|| Error::MissingVariable(name.clone())),
            ValueSource::Join { parts, sep } => {
                let mut values = Vec::with_capacity(parts.len());
                for (i, part) in parts.iter().enumerate() {
                    values.push(self.evaluate(part, &format!("{}/{}", key, i), vars)?);
                }
                Ok(values.join(sep))
            }
        }
    }
}

/// Index of the next value of a `len` long pool at `key`, advancing it.
fn advance(positions: &mut HashMap<String, usize>, key: &str, len: usize) -> Result<usize> {
    if len == 0 {
        return Err(Error::EmptyPool(key.to_string()));
    }
    let position = positions.entry(key.to_string()).or_insert(0);
    let index = *position % len;
    *position = (index + 1) % len;
    Ok(index)
}

fn timestamp(format: &str) -> Result<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(Error::InvalidTimestampFormat(format.to_string()));
    }
    Ok(Local::now().format_with_items(items.into_iter()).to_string())
}
