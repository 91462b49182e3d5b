// SPDX-License-Identifier: PMPL-1.0-or-later

//! Ledger record layout.
//!
//! Every attribute is optional and skipped when unset. Fields this version
//! does not know about are captured in `extra` and written back untouched,
//! so older or newer tools can share one ledger file.

use crate::types::Status;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Histogram keyed by bucket label (`"3.5"` for guess buckets, `"0"`..`"4"` for scores)
pub type Histogram = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub command: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_file: Option<String>,
    #[serde(default)]
    pub stats: RecordStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LedgerRecord {
    pub fn done(command: impl Into<String>, rule_file: Option<String>, stats: RecordStats) -> Self {
        Self {
            command: command.into(),
            status: Status::Done,
            error: None,
            rule_file,
            stats,
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn error(
        command: impl Into<String>,
        message: impl Into<String>,
        rule_file: Option<String>,
        stats: RecordStats,
    ) -> Self {
        Self {
            command: command.into(),
            status: Status::Error,
            error: Some(message.into()),
            rule_file,
            stats,
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Result attributes of one work unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordlist: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u64"
    )]
    pub wordlist_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_f64"
    )]
    pub time: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_f64"
    )]
    pub memory: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_f64"
    )]
    pub cpu: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u64"
    )]
    pub rule_size: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub progress: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub recovered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guesses_log10: Option<Histogram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Histogram>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Accepts numbers that older writers stored as strings (and vice versa).
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected unsigned integer, got {}", n))),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
            Some(other) => Err(D::Error::custom(format!("expected integer, got {}", other))),
        }
    }

    pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected number, got {}", n))),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
            Some(other) => Err(D::Error::custom(format!("expected number, got {}", other))),
        }
    }

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(D::Error::custom(format!("expected string, got {}", other))),
        }
    }
}
