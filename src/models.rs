//! Requests and responses exchanged with the CI over stdin and stdout.
use crate::source::Source;
use crate::time::ZERO_TIME_TIMESTAMP;
use chrono::prelude::*;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Version {
    pub time: DateTime<FixedOffset>,
}

impl Version {
    /// A version for `time`, as seen on the wall clock in `location`.
    pub fn new(time: DateTime<Utc>, location: Tz) -> Self {
        Self {
            time: time.with_timezone(&location).fixed_offset(),
        }
    }

    /// Some clients send `0001-01-01T00:00:00Z` instead of omitting the version.
    pub fn is_zero(&self) -> bool {
        self.time.timestamp() == ZERO_TIME_TIMESTAMP
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.time.with_timezone(&Utc)
    }
}

/// Drops versions that only carry the zero time.
fn present(version: &Option<Version>) -> Option<&Version> {
    version.as_ref().filter(|version| !version.is_zero())
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckRequest {
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub version: Option<Version>,
}

impl CheckRequest {
    /// The version the CI saw last, if any.
    pub fn version(&self) -> Option<&Version> {
        present(&self.version)
    }
}

pub type CheckResponse = Vec<Version>;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InRequest {
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub version: Option<Version>,
}

impl InRequest {
    /// The version to fetch, if any.
    pub fn version(&self) -> Option<&Version> {
        present(&self.version)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OutRequest {
    #[serde(default)]
    pub source: Source,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

impl MetadataField {
    pub fn new(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_owned(),
            value: value.to_string(),
        }
    }
}

/// Response to both `in` and `out`.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct VersionResponse {
    pub version: Version,
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
}
