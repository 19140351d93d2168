//! Roster of managed identities
//!
//! The roster is loaded once at startup from a CSV file and never mutated
//! afterwards. Every remote resource name is derived from an entry's [`Slug`].

pub mod seed;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

pub use seed::{generate_entries, seed_roster_file};

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Roster file not found: {path}")]
    NotFound { path: String },
    #[error("Roster IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("Malformed roster CSV: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },
    #[error("Cannot derive slug: {reason}")]
    InvalidName { reason: String },
}

/// One CSV row as it appears on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
    #[serde(rename = "FirstName")]
    pub given_name: String,
    #[serde(rename = "LastName")]
    pub family_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    /// RFC 3339, e.g. 2006-01-02T15:04:05Z. Empty means unmanaged.
    #[serde(rename = "DateStart", default)]
    pub date_start: String,
}

/// When an entry's resources should come into existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// No start date; the entry is never managed.
    Unscheduled,
    At(DateTime<Utc>),
    /// The start date was present but could not be parsed.
    Malformed(String),
}

impl Activation {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Activation::Unscheduled;
        }
        match DateTime::parse_from_rfc3339(trimmed) {
            Ok(ts) => Activation::At(ts.with_timezone(&Utc)),
            Err(_) => Activation::Malformed(trimmed.to_string()),
        }
    }

    pub fn is_managed(&self) -> bool {
        !matches!(self, Activation::Unscheduled)
    }
}

/// Canonical identifier for an entry's account, organization and workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slug(String);

impl Slug {
    /// Lowercased first letter of the given name followed by the lowercased family name.
    pub fn derive(given_name: &str, family_name: &str) -> Result<Self, RosterError> {
        let family = family_name.trim();
        let initial = given_name
            .trim()
            .chars()
            .next()
            .ok_or_else(|| RosterError::InvalidName {
                reason: "given name is empty".to_string(),
            })?;
        if family.is_empty() {
            return Err(RosterError::InvalidName {
                reason: format!("family name is empty for given name '{}'", given_name.trim()),
            });
        }

        let mut slug: String = initial.to_lowercase().collect();
        slug.push_str(&family.to_lowercase());
        Ok(Slug(slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn org_name(&self) -> String {
        format!("{}-org", self.0)
    }

    pub fn workspace_name(&self) -> String {
        format!("{}-dev", self.0)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub activation: Activation,
    slug: Slug,
}

impl RosterEntry {
    pub fn new(
        given_name: &str,
        family_name: &str,
        email: &str,
        activation: Activation,
    ) -> Result<Self, RosterError> {
        let slug = Slug::derive(given_name, family_name)?;
        Ok(Self {
            given_name: given_name.trim().to_string(),
            family_name: family_name.trim().to_string(),
            email: email.trim().to_string(),
            activation,
            slug,
        })
    }

    pub fn from_record(record: &RosterRecord) -> Result<Self, RosterError> {
        Self::new(
            &record.given_name,
            &record.family_name,
            &record.email,
            Activation::parse(&record.date_start),
        )
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// Immutable snapshot of the roster, shared by every pass.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Build a roster, dropping entries whose slug collides with an earlier one.
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|entry| {
                if seen.insert(entry.slug().clone()) {
                    true
                } else {
                    warn!(
                        slug = %entry.slug(),
                        email = %entry.email,
                        "Duplicate slug in roster, ignoring later entry"
                    );
                    false
                }
            })
            .collect();
        Self { entries }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RosterError::NotFound {
                path: path.display().to_string(),
            });
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RosterError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for (idx, result) in csv_reader.deserialize::<RosterRecord>().enumerate() {
            let record = result?;
            match RosterEntry::from_record(&record) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    // Header is line 1.
                    warn!(line = idx + 2, email = %record.email, error = %e, "Skipping roster row");
                }
            }
        }

        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Entries that carry any activation value, in roster order.
    pub fn managed(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter().filter(|e| e.activation.is_managed())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
