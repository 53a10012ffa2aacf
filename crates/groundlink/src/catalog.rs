//! Satellite Catalog
//!
//! Static satellite records (name plus two-line elements) used to resolve
//! a satellite's display name. Records load from either a JSON document or
//! a raw three-line TLE file:
//!
//! ```text
//! {"25544": {"name": "ISS (ZARYA)", "line1": "1 25544U ...", "line2": "2 25544 ..."}}
//! {"ISS (ZARYA)": {"line1": "1 25544U ...", "line2": "2 25544 ..."}}
//! ```
//!
//! A missing record is an explicit [`LookupError::NotFound`], never a
//! silent default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

/// Errors raised while loading a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed TLE at line {line}: {reason}")]
    Tle { line: usize, reason: String },
}

/// Errors raised by a single lookup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("No satellite record for '{0}'")]
    NotFound(String),

    #[error("Empty satellite key")]
    EmptyKey,
}

/// Synchronous lookup of static satellite configuration
pub trait SatelliteDirectory: Send + Sync {
    /// Display name for a catalog key (NORAD id or name)
    fn satellite_name(&self, key: &str) -> Result<String, LookupError>;

    /// Display names of every record
    fn names(&self) -> Vec<String>;

    /// Record whose display name is `name`
    fn tle_by_name(&self, name: &str) -> Result<TleRecord, LookupError>;
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
}

impl TleRecord {
    /// NORAD catalog number taken from line 1
    pub fn norad_id(&self) -> Option<u32> {
        self.line1.get(2..7)?.trim().parse().ok()
    }
}

/// In-memory catalog keyed as delivered
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    records: BTreeMap<String, TleRecord>,
}

impl FileCatalog {
    /// Load from disk; `.json` files are parsed as JSON, anything else as
    /// three-line TLE text
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let catalog = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&text)?,
            _ => Self::from_tle_text(&text)?,
        };

        info!(path = %path.display(), satellites = catalog.len(), "Satellite catalog loaded");
        Ok(catalog)
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let records: BTreeMap<String, TleRecord> = serde_json::from_str(text)?;
        Ok(Self { records })
    }

    /// Parse name / line 1 / line 2 triples, keyed by name
    pub fn from_tle_text(text: &str) -> Result<Self, CatalogError> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty())
            .collect();

        let mut records = BTreeMap::new();
        for chunk in lines.chunks(3) {
            let [(at, name), (l1, line1), (l2, line2)] = chunk else {
                return Err(CatalogError::Tle {
                    line: chunk[0].0,
                    reason: "incomplete record".to_string(),
                });
            };
            if !line1.starts_with("1 ") {
                return Err(CatalogError::Tle {
                    line: *l1,
                    reason: "expected line 1".to_string(),
                });
            }
            if !line2.starts_with("2 ") {
                return Err(CatalogError::Tle {
                    line: *l2,
                    reason: "expected line 2".to_string(),
                });
            }

            debug!(line = at, satellite = %name, "Parsed TLE");
            records.insert(
                name.to_string(),
                TleRecord {
                    name: Some(name.to_string()),
                    line1: line1.to_string(),
                    line2: line2.to_string(),
                },
            );
        }

        Ok(Self { records })
    }

    /// Record for a key
    pub fn get(&self, key: &str) -> Option<&TleRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SatelliteDirectory for FileCatalog {
    fn satellite_name(&self, key: &str) -> Result<String, LookupError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(LookupError::EmptyKey);
        }

        match self.get(key) {
            Some(record) => Ok(record.name.clone().unwrap_or_else(|| key.to_string())),
            None => Err(LookupError::NotFound(key.to_string())),
        }
    }

    fn names(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|(key, record)| record.name.clone().unwrap_or_else(|| key.clone()))
            .collect()
    }

    fn tle_by_name(&self, name: &str) -> Result<TleRecord, LookupError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LookupError::EmptyKey);
        }

        self.records
            .iter()
            .find(|(key, record)| record.name.as_deref().unwrap_or(key.as_str()) == name)
            .map(|(_, record)| record.clone())
            .ok_or_else(|| LookupError::NotFound(name.to_string()))
    }
}
