//! In-process `PackageStore`, for tests and for running the engine
//! without a database. Mirrors the shape of `SqliteStore` but keeps
//! everything behind a single `Mutex<HashMap<..>>`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::EngineError;
use crate::model::{DownloadStats, Package, PackageId, Version};
use crate::store::PackageStore;

#[derive(Default)]
pub struct MemoryStore {
    packages: Mutex<HashMap<String, Package>>,
    downloads: Mutex<HashMap<String, DownloadStats>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl PackageStore for MemoryStore {
    async fn get_all_packages(&self) -> Result<Vec<Package>, EngineError> {
        Ok(self.packages.lock().unwrap().values().cloned().collect())
    }

    async fn get_all_package_ids(&self) -> Result<Vec<PackageId>, EngineError> {
        Ok(self
            .packages
            .lock()
            .unwrap()
            .values()
            .map(|p| p.id.clone())
            .collect())
    }

    async fn get_package(&self, name: &str) -> Result<Option<Package>, EngineError> {
        Ok(self.packages.lock().unwrap().get(name).cloned())
    }

    async fn get_package_by_id(&self, id: &PackageId) -> Result<Option<Package>, EngineError> {
        Ok(self
            .packages
            .lock()
            .unwrap()
            .values()
            .find(|p| &p.id == id)
            .cloned())
    }

    async fn add_package(&self, package: Package) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        if packages.contains_key(&package.name) {
            return Err(EngineError::AlreadyExists(package.name.clone()));
        }
        packages.insert(package.name.clone(), package);
        Ok(())
    }

    async fn add_or_set_package(&self, package: Package) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        // Upsert keyed by id: a name change on the upstream record must not
        // leave a stale entry behind under the old name.
        if let Some(old_name) = packages
            .values()
            .find(|p| p.id == package.id)
            .map(|p| p.name.clone())
        {
            if old_name != package.name {
                packages.remove(&old_name);
            }
        }
        packages.insert(package.name.clone(), package);
        Ok(())
    }

    async fn remove_package(&self, name: &str, owner: &str) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        match packages.get(name) {
            Some(p) if p.owner == owner => {
                packages.remove(name);
                Ok(())
            }
            Some(_) => Err(EngineError::Validation(format!(
                "`{}` is not owned by `{}`.",
                name, owner
            ))),
            None => Err(EngineError::NotFound),
        }
    }

    async fn set_package_categories(
        &self,
        name: &str,
        categories: Vec<String>,
    ) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        let package = packages.get_mut(name).ok_or(EngineError::NotFound)?;
        package.categories = categories;
        Ok(())
    }

    async fn set_package_repository(
        &self,
        name: &str,
        repository: serde_json::Value,
    ) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        let package = packages.get_mut(name).ok_or(EngineError::NotFound)?;
        package.repository = repository;
        Ok(())
    }

    async fn set_package_errors(&self, name: &str, errors: Vec<String>) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        let package = packages.get_mut(name).ok_or(EngineError::NotFound)?;
        package.errors = errors;
        Ok(())
    }

    async fn add_version(&self, name: &str, version: Version) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        let package = packages.get_mut(name).ok_or(EngineError::NotFound)?;
        if package.find_version(&version.version).is_some() {
            return Err(EngineError::AlreadyExists(version.version));
        }
        package.versions.push(version);
        Ok(())
    }

    async fn update_version(&self, name: &str, version: Version) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        let package = packages.get_mut(name).ok_or(EngineError::NotFound)?;
        let slot = package
            .find_version_mut(&version.version)
            .ok_or(EngineError::NotFound)?;
        *slot = version;
        Ok(())
    }

    async fn remove_version(&self, name: &str, version: &str) -> Result<(), EngineError> {
        let mut packages = self.packages.lock().unwrap();
        let package = packages.get_mut(name).ok_or(EngineError::NotFound)?;
        let before = package.versions.len();
        package.versions.retain(|v| v.version != version);
        if package.versions.len() == before {
            return Err(EngineError::NotFound);
        }
        Ok(())
    }

    async fn has_version(&self, name: &str, version: &str) -> Result<bool, EngineError> {
        let packages = self.packages.lock().unwrap();
        let package = packages.get(name).ok_or(EngineError::NotFound)?;
        Ok(package.find_version(version).is_some())
    }

    async fn get_version_info(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<Version>, EngineError> {
        let packages = self.packages.lock().unwrap();
        let package = packages.get(name).ok_or(EngineError::NotFound)?;
        Ok(package.find_version(version).cloned())
    }

    async fn get_latest_version(&self, name: &str) -> Result<Option<Version>, EngineError> {
        let packages = self.packages.lock().unwrap();
        let package = packages.get(name).ok_or(EngineError::NotFound)?;
        Ok(package.latest_version().cloned())
    }

    async fn search_packages(&self, query: &str) -> Result<Vec<Package>, EngineError> {
        let query = query.to_lowercase();
        Ok(self
            .packages
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.name.contains(&query))
            .cloned()
            .collect())
    }

    async fn get_user_packages(&self, owner: &str) -> Result<Vec<Package>, EngineError> {
        Ok(self
            .packages
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect())
    }

    async fn is_user_package(&self, name: &str, owner: &str) -> Result<bool, EngineError> {
        Ok(self
            .packages
            .lock()
            .unwrap()
            .get(name)
            .map(|p| p.owner == owner)
            .unwrap_or(false))
    }

    async fn add_download(&self, name: &str, version: Option<&str>) -> Result<(), EngineError> {
        let mut downloads = self.downloads.lock().unwrap();
        let stats = downloads.entry(name.to_string()).or_default();
        stats.total += 1;
        if let Some(version) = version {
            *stats.by_version.entry(version.to_string()).or_default() += 1;
        }
        Ok(())
    }

    async fn get_download_stats(&self, name: &str) -> Result<Option<DownloadStats>, EngineError> {
        Ok(self.downloads.lock().unwrap().get(name).cloned())
    }
}
