//! Share manifest (`manifest.json`) types.

use chrono::{DateTime, Duration, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, ShareError};

/// One shared file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Repository-relative path, forward-slash separated.
    pub path: String,
    /// Hex SHA-256 of the file at creation time. Never recomputed.
    pub sha256: String,
}

/// Metadata describing a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub creator: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Revision the diff was taken against, if the repository had one.
    #[serde(default, rename = "base_commit")]
    pub base_revision: Option<String>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub note: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl ShareRecord {
    /// Build a record created at `created_at` that lives for `ttl`.
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>, ttl: Duration) -> Result<Self> {
        let expires_at = created_at
            .checked_add_signed(ttl)
            .filter(|exp| *exp > created_at)
            .ok_or_else(|| ShareError::InvalidDuration(ttl.to_string()))?;

        Ok(Self {
            id: id.into(),
            creator: String::new(),
            created_at,
            expires_at: Some(expires_at),
            base_revision: None,
            note: String::new(),
            files: Vec::new(),
        })
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_base_revision(mut self, base: Option<String>) -> Self {
        self.base_revision = base;
        self
    }

    /// Whether the share is past its expiry at `now`. Equality is not expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if now > exp)
    }

    /// Serialize as pretty JSON, the on-disk manifest form.
    pub fn to_manifest(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse manifest bytes.
    pub fn from_manifest(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn string_or_null<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Timestamp codec for manifests.
///
/// Written as RFC 3339 UTC with whole seconds. Naive timestamps (no offset)
/// are read as local wall-clock time.
pub mod timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn parse(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| format!("invalid timestamp {raw:?}: {e}"))?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|ts| ts.with_timezone(&Utc))
            .ok_or_else(|| format!("nonexistent local time {raw:?}"))
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => s.serialize_str(&format(ts)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) if !raw.is_empty() => parse(&raw).map(Some).map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}
