//! Human-readable `.info` sidecar written next to a propagator file
//!
//! One item per line: `keyword value` or, for several values,
//! `keyword[count] v1 v2 ...`.

use crate::checksum::Checksums;
use crate::header::TimeStamp;
use crate::shape::LatticeShape;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name extension appended to the propagator path
pub const INFO_EXTENSION: &str = ".info";

/// Keywords the sidecar format defines
pub const KNOWN_KEYWORDS: &[&str] = &[
    "magic_number",
    "time_stamp",
    "checksums",
    "nx",
    "ny",
    "nz",
    "nt",
    "quark.mass",
    "quark.naik_epsilon",
    "source.type",
    "source.origin",
    "gauge.filename",
    "gauge.checksums",
];

/// Path of the sidecar for a propagator file
pub fn info_path(prop_path: &Path) -> PathBuf {
    let mut name = prop_path.as_os_str().to_owned();
    name.push(INFO_EXTENSION);
    PathBuf::from(name)
}

/// One keyword with its values, already formatted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoItem {
    /// Keyword
    pub keyword: String,
    /// Formatted values
    pub values: Vec<String>,
}

impl InfoItem {
    /// Item with a single value
    pub fn new(keyword: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            values: vec![value.into()],
        }
    }

    /// Item with several values
    pub fn list(keyword: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            keyword: keyword.into(),
            values,
        }
    }

    /// Whether the keyword is part of the defined table
    pub fn is_known(&self) -> bool {
        KNOWN_KEYWORDS.contains(&self.keyword.as_str())
    }

    /// Write the item as one line
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "{}", self.keyword)?;
        if self.values.len() > 1 {
            write!(out, "[{}]", self.values.len())?;
        }
        for value in &self.values {
            write!(out, " {value}")?;
        }
        writeln!(out)
    }
}

/// Contents of a sidecar file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoFile {
    /// Items in output order
    pub items: Vec<InfoItem>,
}

impl InfoFile {
    /// Required items for a propagator file
    ///
    /// `checksums` holds one quoted hex pair per color written so far.
    pub fn for_propagator(
        magic_number: i32,
        time_stamp: &TimeStamp,
        checksums: &[Checksums],
        shape: &LatticeShape,
    ) -> Self {
        let sums = checksums.iter().map(|c| format!("\"{c}\"")).collect();
        Self {
            items: vec![
                InfoItem::new("magic_number", magic_number.to_string()),
                InfoItem::new("time_stamp", format!("\"{}\"", time_stamp.as_str())),
                InfoItem::list("checksums", sums),
                InfoItem::new("nx", shape.nx().to_string()),
                InfoItem::new("ny", shape.ny().to_string()),
                InfoItem::new("nz", shape.nz().to_string()),
                InfoItem::new("nt", shape.nt().to_string()),
            ],
        }
    }

    /// Append caller-supplied items
    pub fn extend(&mut self, items: impl IntoIterator<Item = InfoItem>) {
        self.items.extend(items);
    }

    /// Keywords not in [`KNOWN_KEYWORDS`]
    pub fn unknown_keywords(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|item| !item.is_known())
            .map(|item| item.keyword.as_str())
            .collect()
    }

    /// Write every item
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for item in &self.items {
            item.write_to(out)?;
        }
        Ok(())
    }
}
