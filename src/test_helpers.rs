//! Shared fixtures for integration-style tests: a `tempdir`-rooted
//! `SqliteStore` and a `Registry` wired to a mock repository factory,
//! following the teacher's `test_helpers.rs` (a `TempDir`-rooted
//! settings + store pair).

use std::path::Path;
use std::sync::Arc;
use tempdir::TempDir;

use crate::config::EngineConfig;
use crate::facade::Registry;
use crate::repository::mock::{FactoryOf, MockRepositoryDriver};
use crate::repository::RepositoryDriverFactory;
use crate::store::sqlite::SqliteStore;
use crate::store::PackageStore;

pub fn get_data_root() -> TempDir {
    TempDir::new("wharf_test").unwrap()
}

pub fn get_test_store(data_dir: &Path) -> Arc<dyn PackageStore> {
    Arc::new(SqliteStore::open(data_dir.join("wharf.sqlite")).unwrap())
}

pub fn get_test_registry(data_dir: &Path, driver: MockRepositoryDriver) -> Registry {
    let store = get_test_store(data_dir);
    let factory: Arc<dyn RepositoryDriverFactory> = Arc::new(FactoryOf(Arc::new(driver)));
    Registry::new(store, factory, EngineConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_get_test_registry_builds_a_usable_store() {
        let data_dir = get_data_root();
        let registry = get_test_registry(data_dir.path(), MockRepositoryDriver::new());
        assert!(registry.get_packages("alice").await.unwrap().is_empty());
    }
}
