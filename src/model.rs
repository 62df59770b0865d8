//! Core entities: `Package`, `Version`, and the opaque id that ties a
//! package record to its creation time.

use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Opaque, unique package id.
///
/// The first 8 hex characters are a big-endian unix timestamp (seconds);
/// the rest are random. This lets a package's creation date be recovered
/// from the id alone, the way a Mongo-style ObjectId embeds its creation
/// time, without needing a separate "created_at" column everywhere the id
/// travels.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PackageId(String);

impl PackageId {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(when: DateTime<Utc>) -> Self {
        let secs = when.timestamp().max(0) as u32;
        let mut rest = [0u8; 6];
        rand::rng().fill_bytes(&mut rest);
        let mut s = format!("{:08x}", secs);
        for b in rest.iter() {
            s.push_str(&format!("{:02x}", b));
        }
        PackageId(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the creation timestamp embedded in the id.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let secs = u32::from_str_radix(self.0.get(0..8)?, 16).ok()?;
        Utc.timestamp_opt(secs as i64, 0).single()
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PackageId {
    fn from(s: String) -> Self {
        PackageId(s)
    }
}

/// A registry-visible package: ownership, the repository it tracks, its
/// discovered versions, and the last reconciliation's errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub owner: String,
    /// Canonical, lower-case name. Unique across the registry.
    pub name: String,
    /// Opaque document understood by the repository driver.
    pub repository: serde_json::Value,
    pub categories: Vec<String>,
    pub versions: Vec<Version>,
    /// Error strings from the most recent reconciliation run.
    pub errors: Vec<String>,
}

impl Package {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, repository: serde_json::Value) -> Self {
        Package {
            id: PackageId::new(),
            owner: owner.into(),
            name: name.into(),
            repository,
            categories: Vec::new(),
            versions: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn find_version(&self, version: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn find_version_mut(&mut self, version: &str) -> Option<&mut Version> {
        self.versions.iter_mut().find(|v| v.version == version)
    }

    /// The "latest" version: highest SemVer tag, ignoring branch versions.
    /// `None` if the package has no tagged releases.
    pub fn latest_version(&self) -> Option<&Version> {
        self.versions
            .iter()
            .filter(|v| !v.version.starts_with('~'))
            .filter_map(|v| semver::Version::parse(&v.version).ok().map(|sv| (sv, v)))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, v)| v)
    }
}

/// One release or branch snapshot of a package.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Version {
    /// Either a bare SemVer triple (`"1.2.3"`) or a branch marker
    /// (`"~branch-name"`).
    pub version: String,
    pub commit: String,
    pub date: DateTime<Utc>,
    /// Normalized recipe document, including `packageDescriptionFile`.
    pub recipe: serde_json::Value,
    pub readme_path: Option<String>,
}

impl Version {
    pub fn is_branch(&self) -> bool {
        self.version.starts_with('~')
    }
}

/// Download counters for a package, optionally broken down per version.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DownloadStats {
    pub total: u64,
    pub by_version: std::collections::HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_id_round_trips_timestamp() {
        let when = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let id = PackageId::at(when);
        assert_eq!(Some(when), id.created_at());
    }

    #[test]
    fn test_package_ids_are_unique() {
        let a = PackageId::new();
        let b = PackageId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_latest_version_ignores_branches() {
        let mut pkg = Package::new("alice", "foo", serde_json::json!({}));
        pkg.versions.push(Version {
            version: "~master".to_string(),
            commit: "a".to_string(),
            date: Utc::now(),
            recipe: serde_json::json!({}),
            readme_path: None,
        });
        pkg.versions.push(Version {
            version: "1.0.0".to_string(),
            commit: "b".to_string(),
            date: Utc::now(),
            recipe: serde_json::json!({}),
            readme_path: None,
        });
        pkg.versions.push(Version {
            version: "1.2.0".to_string(),
            commit: "c".to_string(),
            date: Utc::now(),
            recipe: serde_json::json!({}),
            readme_path: None,
        });
        assert_eq!("1.2.0", pkg.latest_version().unwrap().version);
    }
}
