//! A minimal HL7 v2 message model rendered to ER7 (pipe delimited) text.
//!
//! Values are stored verbatim: component (`^`) and sub-component (`&`)
//! separators inside a value are the caller's business, nothing is escaped.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::error::Error;

pub const FIELD_SEPARATOR: char = '|';
pub const SEGMENT_TERMINATOR: char = '\r';
/// MSH-2: component, repetition, escape and sub-component characters.
pub const ENCODING_CHARACTERS: &str = "^~\\&";

/// One segment: an id such as `PID` plus a sparse set of 1-based fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    id: String,
    fields: BTreeMap<usize, String>,
}

impl Segment {
    pub fn new(id: impl Into<String>) -> Self {
        Segment {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sets field `field` (1-based, as in `PID-3`).
    ///
    /// For `MSH` the first two fields are fixed (the separator and the
    /// encoding characters), so only MSH-3 onwards are rendered.
    pub fn set(&mut self, field: usize, value: impl Into<String>) -> &mut Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn get(&self, field: usize) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    fn is_header(&self) -> bool {
        self.id == "MSH"
    }

    /// Renders this segment without a terminator.
    pub fn render(&self) -> String {
        let last = self.fields.keys().next_back().copied().unwrap_or(0);
        let mut out = String::with_capacity(self.id.len() + 8 * last);
        out.push_str(&self.id);

        let first = if self.is_header() {
            out.push(FIELD_SEPARATOR);
            out.push_str(ENCODING_CHARACTERS);
            3
        } else {
            1
        };
        for field in first..=last {
            out.push(FIELD_SEPARATOR);
            if let Some(value) = self.fields.get(&field) {
                out.push_str(value);
            }
        }
        out
    }
}

/// An ordered list of segments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    segments: Vec<Segment>,
}

impl Message {
    pub fn new() -> Self {
        Message::default()
    }

    /// Appends a new, empty segment and returns it for population.
    pub fn segment(&mut self, id: impl Into<String>) -> &mut Segment {
        self.segments.push(Segment::new(id));
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Sets a field on the first segment with id `segment`. Returns `false`
    /// if the message has no such segment.
    pub fn set(&mut self, segment: &str, field: usize, value: impl Into<String>) -> bool {
        match self.segments.iter_mut().find(|s| s.id == segment) {
            Some(s) => {
                s.set(field, value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, segment: &str, field: usize) -> Option<&str> {
        self.segments
            .iter()
            .find(|s| s.id == segment)
            .and_then(|s| s.get(field))
    }

    /// The ER7 encoding: segments joined by carriage returns.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push(SEGMENT_TERMINATOR);
            }
            out.push_str(&segment.render());
        }
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A field address such as `ORC-5`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    pub segment: String,
    pub field: usize,
}

impl FieldRef {
    pub fn new(segment: impl Into<String>, field: usize) -> Self {
        FieldRef {
            segment: segment.into(),
            field,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.segment, self.field)
    }
}

impl FromStr for FieldRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidField(s.to_string());
        let (segment, field) = s.split_once(&['-', '.'][..]).ok_or_else(invalid)?;
        let field: usize = field.parse().map_err(|_| invalid())?;
        if segment.len() != 3 || !segment.chars().all(|c| c.is_ascii_alphanumeric()) || field == 0 {
            return Err(invalid());
        }
        Ok(FieldRef::new(segment.to_ascii_uppercase(), field))
    }
}

impl<'de> Deserialize<'de> for FieldRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// Converts a payload typed with line breaks into ER7 segment breaks.
pub fn normalize_segment_breaks(text: &str) -> String {
    text.replace("\r\n", "\r")
        .replace('\n', "\r")
        .trim_end_matches('\r')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn renders_header_with_encoding_characters() {
        let mut msg = Message::new();
        msg.segment("MSH")
            .set(3, "COMRAD")
            .set(5, "ReceivingApp")
            .set(9, "ORM^O01")
            .set(12, "2.4");

        assert_eq!(msg.render(), "MSH|^~\\&|COMRAD||ReceivingApp||||ORM^O01|||2.4");
    }

    #[test]
    fn renders_sparse_fields_up_to_the_last_one_set() {
        let mut segment = Segment::new("PID");
        segment.set(3, "TEST10001").set(5, "Doe^John").set(8, "M");

        assert_eq!(segment.render(), "PID|||TEST10001||Doe^John|||M");
    }

    #[test]
    fn empty_segment_is_just_its_id() {
        assert_eq!(Segment::new("EVN").render(), "EVN");
        assert_eq!(Segment::new("MSH").render(), "MSH|^~\\&");
    }

    #[test]
    fn segments_are_separated_not_terminated() {
        let mut msg = Message::new();
        msg.segment("MSH").set(3, "A");
        msg.segment("PID").set(1, "1");

        assert_eq!(msg.render(), "MSH|^~\\&|A\rPID|1");
    }

    #[test]
    fn set_targets_first_matching_segment() {
        let mut msg = Message::new();
        msg.segment("ORC").set(5, "SC");
        msg.segment("OBR").set(1, "1");

        assert!(msg.set("ORC", 5, "CM"));
        assert!(!msg.set("MRG", 1, "OLD"));
        assert_eq!(msg.get("ORC", 5), Some("CM"));
        assert_eq!(msg.get("OBR", 2), None);
    }

    #[rstest]
    #[case("ORC-5", "ORC", 5)]
    #[case("obr.24", "OBR", 24)]
    #[case("PV1-44", "PV1", 44)]
    fn parses_field_refs(#[case] input: &str, #[case] segment: &str, #[case] field: usize) {
        assert_eq!(input.parse::<FieldRef>().expect("valid"), FieldRef::new(segment, field));
    }

    #[rstest]
    #[case("ORC")]
    #[case("ORC-0")]
    #[case("ORCX-1")]
    #[case("ORC-x")]
    fn rejects_bad_field_refs(#[case] input: &str) {
        assert!(input.parse::<FieldRef>().is_err());
    }

    #[test]
    fn normalizes_line_breaks() {
        assert_eq!(normalize_segment_breaks("MSH|a\r\nPID|b\nPV1|c\n"), "MSH|a\rPID|b\rPV1|c");
    }
}
