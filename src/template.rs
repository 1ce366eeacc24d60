//! Payload templates: which segments a message has and where each field's
//! value comes from.
//!
//! Templates are plain data, usually read from TOML:
//!
//! ```toml
//! name = "orm-o01"
//!
//! [vars]
//! placer = { digits = 8 }
//!
//! [[segments]]
//! id = "MSH"
//! fields = { 3 = { cycle = ["XRGE", "SIRJ"] }, 9 = "ORM^O01" }
//!
//! [[segments]]
//! id = "ORC"
//! fields = { 2 = { var = "placer" }, 5 = { cycle = ["SC", "IP", "CM"] } }
//! ```
//!
//! All mutable state used while evaluating a template (cycle positions, the
//! message counter, the RNG) lives in a [`crate::Session`].

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::fake::FakeKind;
use crate::message::FieldRef;

/// Where a single field value comes from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Round-robin through the list, one step per generated message.
    Cycle(Vec<String>),
    /// Uniform random pick.
    Choice(Vec<String>),
    /// Random string of this many decimal digits.
    Digits(usize),
    /// Random integer, both bounds inclusive.
    Number { min: u64, max: u64 },
    /// Local time now, in chrono `strftime` syntax.
    Timestamp(String),
    /// The session's message sequence number, zero padded to `width`.
    Sequence {
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        width: usize,
        #[serde(default)]
        suffix: String,
    },
    /// Round-robin through a column of the session's dataset.
    Column {
        name: String,
        /// Used when no dataset, or no such column, is loaded.
        #[serde(default)]
        fallback: Option<Box<ValueSource>>,
    },
    /// Round-robin through values captured from earlier messages into
    /// `pool` (see [`Template::captures`]).
    Captured {
        pool: String,
        /// Used while nothing has been captured yet.
        #[serde(default)]
        fallback: Option<Box<ValueSource>>,
    },
    Fake(FakeKind),
    /// A per-message variable from the template's `vars`.
    Var(String),
    /// Each part evaluated, then joined, `^` by default (HL7 components).
    Join {
        parts: Vec<ValueSource>,
        #[serde(default = "component_separator")]
        sep: String,
    },
    #[serde(untagged)]
    Static(String),
}

fn component_separator() -> String {
    "^".to_string()
}

impl ValueSource {
    pub fn fixed(text: impl Into<String>) -> Self {
        ValueSource::Static(text.into())
    }

    pub fn cycle<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ValueSource::Cycle(values.into_iter().map(Into::into).collect())
    }

    pub fn choice<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ValueSource::Choice(values.into_iter().map(Into::into).collect())
    }

    pub fn join(parts: Vec<ValueSource>) -> Self {
        ValueSource::Join {
            parts,
            sep: component_separator(),
        }
    }
}

impl From<&str> for ValueSource {
    fn from(text: &str) -> Self {
        ValueSource::Static(text.to_string())
    }
}

/// One segment of a template and the sources of its fields.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSegmentTemplate")]
pub struct SegmentTemplate {
    pub id: String,
    pub fields: BTreeMap<usize, ValueSource>,
}

impl SegmentTemplate {
    pub fn new(id: impl Into<String>) -> Self {
        SegmentTemplate {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, field: usize, source: impl Into<ValueSource>) -> Self {
        self.fields.insert(field, source.into());
        self
    }
}

// TOML table keys are always strings, so field numbers arrive as "3", "44".
#[derive(Deserialize)]
struct RawSegmentTemplate {
    id: String,
    #[serde(default)]
    fields: BTreeMap<String, ValueSource>,
}

impl TryFrom<RawSegmentTemplate> for SegmentTemplate {
    type Error = String;

    fn try_from(raw: RawSegmentTemplate) -> std::result::Result<Self, Self::Error> {
        let mut fields = BTreeMap::new();
        for (key, source) in raw.fields {
            let field: usize = key
                .trim()
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("{}: field key '{}' is not a positive number", raw.id, key))?;
            fields.insert(field, source);
        }
        Ok(SegmentTemplate { id: raw.id, fields })
    }
}

/// A complete message description.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Evaluated once per message, before any field, so several fields can
    /// share one random value (e.g. ORC-2 and OBR-2).
    #[serde(default)]
    pub vars: BTreeMap<String, ValueSource>,
    pub segments: Vec<SegmentTemplate>,
    /// Fields whose generated value is appended to a named session pool,
    /// e.g. `patients = "PID-3"` so a later merge can name the prior patient.
    #[serde(default)]
    pub captures: BTreeMap<String, FieldRef>,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Template {
            name: name.into(),
            description: String::new(),
            vars: BTreeMap::new(),
            segments: Vec::new(),
            captures: BTreeMap::new(),
        }
    }

    pub fn var(mut self, name: impl Into<String>, source: impl Into<ValueSource>) -> Self {
        self.vars.insert(name.into(), source.into());
        self
    }

    pub fn segment(mut self, segment: SegmentTemplate) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn capture(mut self, pool: impl Into<String>, field: FieldRef) -> Self {
        self.captures.insert(pool.into(), field);
        self
    }

    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| Error::Config {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
name = "demo"

[vars]
placer = { digits = 8 }

[[segments]]
id = "MSH"
fields = { 3 = { cycle = ["XRGE", "SIRJ"] }, 9 = "ORM^O01", 7 = { timestamp = "%Y%m%d%H%M" } }

[[segments]]
id = "PID"

[segments.fields]
3 = { sequence = { prefix = "TEST1", width = 4 } }
5 = { join = { parts = [{ fake = { kind = "last_name" } }, { fake = { kind = "first_name" } }] } }
8 = { choice = ["M", "F"] }

[[segments]]
id = "OBR"
fields = { 2 = { var = "placer" }, 5 = { column = { name = "OBR-5", fallback = "" } } }
"#;

    #[test]
    fn parses_toml_template() {
        let template = Template::from_toml_str(TOML, Path::new("demo.toml")).expect("valid template");

        assert_eq!(template.name, "demo");
        assert_eq!(template.vars["placer"], ValueSource::Digits(8));
        assert_eq!(template.segments.len(), 3);

        let msh = &template.segments[0];
        assert_eq!(msh.fields[&3], ValueSource::cycle(["XRGE", "SIRJ"]));
        assert_eq!(msh.fields[&9], ValueSource::fixed("ORM^O01"));

        let pid = &template.segments[1];
        assert_eq!(
            pid.fields[&3],
            ValueSource::Sequence {
                prefix: "TEST1".into(),
                width: 4,
                suffix: String::new()
            }
        );
        assert_eq!(
            pid.fields[&5],
            ValueSource::join(vec![
                ValueSource::Fake(FakeKind::LastName),
                ValueSource::Fake(FakeKind::FirstName)
            ])
        );

        let obr = &template.segments[2];
        assert_eq!(
            obr.fields[&5],
            ValueSource::Column {
                name: "OBR-5".into(),
                fallback: Some(Box::new(ValueSource::fixed("")))
            }
        );
    }

    #[test]
    fn parses_captures_and_captured_sources() {
        let text = r#"
name = "merge"

[vars]
prior = { captured = { pool = "patients", fallback = "UNKNOWN" } }

[[segments]]
id = "MRG"
fields = { 1 = { var = "prior" } }

[captures]
merged = "MRG-1"
"#;
        let template = Template::from_toml_str(text, Path::new("merge.toml")).expect("valid template");

        assert_eq!(
            template.vars["prior"],
            ValueSource::Captured {
                pool: "patients".into(),
                fallback: Some(Box::new(ValueSource::fixed("UNKNOWN")))
            }
        );
        assert_eq!(template.captures["merged"], FieldRef::new("MRG", 1));
    }

    #[test]
    fn rejects_non_numeric_field_keys() {
        let text = "name = \"bad\"\n[[segments]]\nid = \"PID\"\nfields = { three = \"x\" }\n";
        assert!(matches!(
            Template::from_toml_str(text, Path::new("bad.toml")),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn builds_in_code() {
        let template = Template::new("inline")
            .var("id", ValueSource::Digits(4))
            .segment(SegmentTemplate::new("PID").field(3, ValueSource::Var("id".into())).field(8, "F"));

        assert_eq!(template.segments[0].fields[&8], ValueSource::fixed("F"));
    }
}
