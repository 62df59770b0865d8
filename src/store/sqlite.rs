//! SQLite-backed `PackageStore`.
//!
//! Generalizes the teacher's `database/mod.rs` relational `crates` /
//! `crate_versions` schema (one row per crate, one row per version, with
//! a `metadata TEXT` column holding a JSON blob of extra fields) into a
//! single `packages` table storing the whole package record — including
//! its version list — as one JSON document per row. That's the same
//! "store a JSON blob in a TEXT column" trick the teacher already uses
//! for `crate_versions.metadata`, just applied to the whole record
//! instead of the per-version leftovers, since this engine's `Package`
//! is a document, not a normalized relation.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::errors::EngineError;
use crate::model::{DownloadStats, Package, PackageId, Version};
use crate::store::PackageStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        init(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        init(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

fn init(conn: &Connection) -> Result<(), EngineError> {
    conn.execute_batch(
        r#"
        BEGIN;
        CREATE TABLE IF NOT EXISTS packages
        (
            id    TEXT PRIMARY KEY,
            name  TEXT NOT NULL,
            owner TEXT NOT NULL,
            data  TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_name
            ON packages (name);
        CREATE TABLE IF NOT EXISTS downloads
        (
            name    TEXT NOT NULL,
            version TEXT,
            count   INTEGER NOT NULL DEFAULT 0
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_downloads_name_version
            ON downloads (name, version);
        COMMIT;
        "#,
    )?;
    Ok(())
}

fn row_to_package(data: String) -> Result<Package, EngineError> {
    Ok(serde_json::from_str(&data)?)
}

#[async_trait]
impl PackageStore for SqliteStore {
    async fn get_all_packages(&self) -> Result<Vec<Package>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM packages")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row_to_package(row?)?);
        }
        Ok(out)
    }

    async fn get_all_package_ids(&self) -> Result<Vec<PackageId>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM packages")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(PackageId::from(row?));
        }
        Ok(out)
    }

    async fn get_package(&self, name: &str) -> Result<Option<Package>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM packages WHERE name = ?",
                params![name],
                |row| row.get(0),
            )
            .ok();
        data.map(row_to_package).transpose()
    }

    async fn get_package_by_id(&self, id: &PackageId) -> Result<Option<Package>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM packages WHERE id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .ok();
        data.map(row_to_package).transpose()
    }

    async fn add_package(&self, package: Package) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM packages WHERE name = ?",
                params![package.name],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if exists {
            return Err(EngineError::AlreadyExists(package.name));
        }
        let data = serde_json::to_string(&package)?;
        conn.execute(
            "INSERT INTO packages (id, name, owner, data) VALUES (?, ?, ?, ?)",
            params![package.id.as_str(), package.name, package.owner, data],
        )?;
        Ok(())
    }

    async fn add_or_set_package(&self, package: Package) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        // Upsert keyed by id, not name: the mirrored record may have been
        // renamed upstream since the last pull.
        let old_name: Option<String> = conn
            .query_row(
                "SELECT name FROM packages WHERE id = ?",
                params![package.id.as_str()],
                |row| row.get(0),
            )
            .ok();
        if let Some(old_name) = &old_name {
            if old_name != &package.name {
                conn.execute("DELETE FROM packages WHERE name = ?", params![old_name])?;
            }
        }
        let data = serde_json::to_string(&package)?;
        conn.execute(
            "INSERT INTO packages (id, name, owner, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name = ?2, owner = ?3, data = ?4",
            params![package.id.as_str(), package.name, package.owner, data],
        )?;
        Ok(())
    }

    async fn remove_package(&self, name: &str, owner: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM packages WHERE name = ? AND owner = ?",
            params![name, owner],
        )?;
        if n == 0 {
            return Err(EngineError::NotFound);
        }
        Ok(())
    }

    async fn set_package_categories(
        &self,
        name: &str,
        categories: Vec<String>,
    ) -> Result<(), EngineError> {
        self.mutate_package(name, |p| p.categories = categories)
    }

    async fn set_package_repository(
        &self,
        name: &str,
        repository: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.mutate_package(name, |p| p.repository = repository)
    }

    async fn set_package_errors(&self, name: &str, errors: Vec<String>) -> Result<(), EngineError> {
        self.mutate_package(name, |p| p.errors = errors)
    }

    async fn add_version(&self, name: &str, version: Version) -> Result<(), EngineError> {
        let vers = version.version.clone();
        self.mutate_package_fallible(name, move |p| {
            if p.find_version(&vers).is_some() {
                return Err(EngineError::AlreadyExists(vers));
            }
            p.versions.push(version);
            Ok(())
        })
    }

    async fn update_version(&self, name: &str, version: Version) -> Result<(), EngineError> {
        self.mutate_package_fallible(name, move |p| {
            let slot = p
                .find_version_mut(&version.version)
                .ok_or(EngineError::NotFound)?;
            *slot = version;
            Ok(())
        })
    }

    async fn remove_version(&self, name: &str, version: &str) -> Result<(), EngineError> {
        let version = version.to_string();
        self.mutate_package_fallible(name, move |p| {
            let before = p.versions.len();
            p.versions.retain(|v| v.version != version);
            if p.versions.len() == before {
                return Err(EngineError::NotFound);
            }
            Ok(())
        })
    }

    async fn has_version(&self, name: &str, version: &str) -> Result<bool, EngineError> {
        let package = self.get_package(name).await?.ok_or(EngineError::NotFound)?;
        Ok(package.find_version(version).is_some())
    }

    async fn get_version_info(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<Version>, EngineError> {
        let package = self.get_package(name).await?.ok_or(EngineError::NotFound)?;
        Ok(package.find_version(version).cloned())
    }

    async fn get_latest_version(&self, name: &str) -> Result<Option<Version>, EngineError> {
        let package = self.get_package(name).await?.ok_or(EngineError::NotFound)?;
        Ok(package.latest_version().cloned())
    }

    async fn search_packages(&self, query: &str) -> Result<Vec<Package>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let needle = format!("%{}%", query.to_lowercase());
        let mut stmt = conn.prepare("SELECT data FROM packages WHERE name LIKE ?")?;
        let rows = stmt.query_map(params![needle], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row_to_package(row?)?);
        }
        Ok(out)
    }

    async fn get_user_packages(&self, owner: &str) -> Result<Vec<Package>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM packages WHERE owner = ?")?;
        let rows = stmt.query_map(params![owner], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row_to_package(row?)?);
        }
        Ok(out)
    }

    async fn is_user_package(&self, name: &str, owner: &str) -> Result<bool, EngineError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT 1 FROM packages WHERE name = ? AND owner = ?",
                params![name, owner],
                |_| Ok(true),
            )
            .unwrap_or(false))
    }

    async fn add_download(&self, name: &str, version: Option<&str>) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO downloads (name, version, count) VALUES (?1, ?2, 1)
             ON CONFLICT(name, version) DO UPDATE SET count = count + 1",
            params![name, version],
        )?;
        Ok(())
    }

    async fn get_download_stats(&self, name: &str) -> Result<Option<DownloadStats>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT version, count FROM downloads WHERE name = ?")?;
        let rows = stmt.query_map(params![name], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, u64>(1)?))
        })?;
        let mut stats = DownloadStats::default();
        let mut any = false;
        for row in rows {
            let (version, count) = row?;
            any = true;
            match version {
                Some(v) => {
                    stats.by_version.insert(v, count);
                }
                None => stats.total += count,
            }
        }
        stats.total += stats.by_version.values().sum::<u64>();
        Ok(if any { Some(stats) } else { None })
    }
}

impl SqliteStore {
    fn mutate_package(
        &self,
        name: &str,
        f: impl FnOnce(&mut Package),
    ) -> Result<(), EngineError> {
        self.mutate_package_fallible(name, |p| {
            f(p);
            Ok(())
        })
    }

    fn mutate_package_fallible(
        &self,
        name: &str,
        f: impl FnOnce(&mut Package) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        let data: String = conn.query_row(
            "SELECT data FROM packages WHERE name = ?",
            params![name],
            |row| row.get(0),
        )?;
        let mut package: Package = serde_json::from_str(&data)?;
        f(&mut package)?;
        let data = serde_json::to_string(&package)?;
        conn.execute(
            "UPDATE packages SET data = ? WHERE name = ?",
            params![data, name],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str) -> Package {
        Package::new("alice", name, serde_json::json!({}))
    }

    #[actix_rt::test]
    async fn test_add_and_get_package() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_package(pkg("foo")).await.unwrap();
        let got = store.get_package("foo").await.unwrap().unwrap();
        assert_eq!("foo", got.name);
        assert_eq!("alice", got.owner);
    }

    #[actix_rt::test]
    async fn test_add_package_rejects_duplicate_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_package(pkg("foo")).await.unwrap();
        assert!(store.add_package(pkg("foo")).await.is_err());
    }

    #[actix_rt::test]
    async fn test_add_or_set_package_upserts_by_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut p = pkg("foo");
        let id = p.id.clone();
        store.add_or_set_package(p.clone()).await.unwrap();
        p.name = "bar".to_string();
        store.add_or_set_package(p).await.unwrap();

        assert!(store.get_package("foo").await.unwrap().is_none());
        let renamed = store.get_package("bar").await.unwrap().unwrap();
        assert_eq!(id, renamed.id);
    }

    #[actix_rt::test]
    async fn test_version_add_update_remove_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_package(pkg("foo")).await.unwrap();
        let v = Version {
            version: "1.0.0".to_string(),
            commit: "a".to_string(),
            date: chrono::Utc::now(),
            recipe: serde_json::json!({}),
            readme_path: None,
        };
        store.add_version("foo", v.clone()).await.unwrap();
        assert!(store.has_version("foo", "1.0.0").await.unwrap());

        let mut v2 = v.clone();
        v2.commit = "b".to_string();
        store.update_version("foo", v2).await.unwrap();
        assert_eq!(
            "b",
            store
                .get_version_info("foo", "1.0.0")
                .await
                .unwrap()
                .unwrap()
                .commit
        );

        store.remove_version("foo", "1.0.0").await.unwrap();
        assert!(!store.has_version("foo", "1.0.0").await.unwrap());
    }

    #[actix_rt::test]
    async fn test_download_stats_accumulate() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_download("foo", Some("1.0.0")).await.unwrap();
        store.add_download("foo", Some("1.0.0")).await.unwrap();
        let stats = store.get_download_stats("foo").await.unwrap().unwrap();
        assert_eq!(2, stats.by_version["1.0.0"]);
    }
}
