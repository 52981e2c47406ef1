use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::names::validate_name;

const SUFFIX_LEN: usize = 8;
const DATE_FORMAT: &str = "%Y%m%d";

/// Identity of one build output: `<build>_<YYYYMMDD>_<suffix>`.
///
/// The date is the generation timestamp stamped onto documents by the sync
/// applier, so re-applying the same change set writes identical values. The
/// random suffix keeps two builds on the same day apart.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenerationId {
    build: String,
    date: NaiveDate,
    suffix: String,
}

impl GenerationId {
    /// A fresh generation of `build` dated `date`, with a random suffix.
    pub fn new(build: &str, date: NaiveDate) -> Result<Self, TypeError> {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self::with_suffix(build, date, &suffix)
    }

    /// A fresh generation dated today (UTC).
    pub fn today(build: &str) -> Result<Self, TypeError> {
        Self::new(build, Utc::now().date_naive())
    }

    pub fn with_suffix(build: &str, date: NaiveDate, suffix: &str) -> Result<Self, TypeError> {
        validate_name("build", build)?;
        if suffix.len() != SUFFIX_LEN || !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TypeError::InvalidGeneration(format!("{build}_{suffix}")));
        }
        Ok(Self {
            build: build.to_string(),
            date,
            suffix: suffix.to_string(),
        })
    }

    /// Parse a generation collection name.
    pub fn parse(name: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidGeneration(name.to_string());
        let mut parts = name.rsplitn(3, '_');
        let suffix = parts.next().ok_or_else(invalid)?;
        let date = parts.next().ok_or_else(invalid)?;
        let build = parts.next().ok_or_else(invalid)?;
        if date.len() != 8 || !date.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| invalid())?;
        Self::with_suffix(build, date, suffix).map_err(|_| invalid())
    }

    pub fn build(&self) -> &str {
        &self.build
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Collection name of this generation.
    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.build, self.date.format(DATE_FORMAT), self.suffix)
    }

    /// Generation timestamp: the generation date at 00:00 UTC.
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(NaiveTime::MIN))
    }
}

impl fmt::Debug for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenerationId({})", self.name())
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl TryFrom<String> for GenerationId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<GenerationId> for String {
    fn from(g: GenerationId) -> Self {
        g.name()
    }
}

/// Name of the published collection of `build`.
pub fn current_collection(build: &str) -> String {
    format!("{build}_current")
}

/// Generations of `build` among `collections`, oldest first.
///
/// Names that do not parse, or that belong to a different build (including
/// builds whose name merely starts with `build`), are skipped.
pub fn list_generations<I, S>(collections: I, build: &str) -> Vec<GenerationId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut found: Vec<GenerationId> = collections
        .into_iter()
        .filter_map(|name| GenerationId::parse(name.as_ref()).ok())
        .filter(|g| g.build == build)
        .collect();
    found.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.suffix.cmp(&b.suffix)));
    found
}
