//! Templates shipped with the crate.

use std::path::Path;

use crate::error::{Error, Result};
use crate::template::Template;

const BUILTINS: &[(&str, &str)] = &[
    ("orm-o01", include_str!("../templates/orm-o01.toml")),
    ("adt-a08", include_str!("../templates/adt-a08.toml")),
    ("adt-a43", include_str!("../templates/adt-a43.toml")),
];

/// Names of the built-in templates.
pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

/// Looks up a built-in template by name.
pub fn builtin(name: &str) -> Result<Template> {
    let (_, text) = BUILTINS
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::UnknownTemplate(name.to_string()))?;
    Template::from_toml_str(text, Path::new(&format!("builtin:{}", name)))
}

/// Resolves `name_or_path` as a built-in name, falling back to a TOML file path.
pub fn resolve(name_or_path: &str) -> Result<Template> {
    match builtin(name_or_path) {
        Err(Error::UnknownTemplate(_)) if Path::new(name_or_path).is_file() => Template::from_path(name_or_path),
        other => other,
    }
}
