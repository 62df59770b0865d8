//! The persistence layer: a document store holding packages, versions,
//! and download statistics.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::model::{DownloadStats, Package, PackageId, Version};

/// Store interface consumed by the reconciler, the facade, and the
/// mirror reconciler. Implementations: `memory::MemoryStore` (tests, or
/// running without a database) and `sqlite::SqliteStore`.
#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn get_all_packages(&self) -> Result<Vec<Package>, EngineError>;
    async fn get_all_package_ids(&self) -> Result<Vec<PackageId>, EngineError>;
    async fn get_package(&self, name: &str) -> Result<Option<Package>, EngineError>;
    async fn get_package_by_id(&self, id: &PackageId) -> Result<Option<Package>, EngineError>;

    /// Insert a brand-new package. Errors if the name already exists.
    async fn add_package(&self, package: Package) -> Result<(), EngineError>;
    /// Upsert keyed by id — used by the mirror reconciler to converge a
    /// dump from an upstream registry.
    async fn add_or_set_package(&self, package: Package) -> Result<(), EngineError>;
    async fn remove_package(&self, name: &str, owner: &str) -> Result<(), EngineError>;

    async fn set_package_categories(&self, name: &str, categories: Vec<String>) -> Result<(), EngineError>;
    async fn set_package_repository(&self, name: &str, repository: serde_json::Value) -> Result<(), EngineError>;
    async fn set_package_errors(&self, name: &str, errors: Vec<String>) -> Result<(), EngineError>;

    async fn add_version(&self, name: &str, version: Version) -> Result<(), EngineError>;
    async fn update_version(&self, name: &str, version: Version) -> Result<(), EngineError>;
    async fn remove_version(&self, name: &str, version: &str) -> Result<(), EngineError>;
    async fn has_version(&self, name: &str, version: &str) -> Result<bool, EngineError>;
    async fn get_version_info(&self, name: &str, version: &str) -> Result<Option<Version>, EngineError>;
    async fn get_latest_version(&self, name: &str) -> Result<Option<Version>, EngineError>;

    async fn search_packages(&self, query: &str) -> Result<Vec<Package>, EngineError>;
    async fn get_user_packages(&self, owner: &str) -> Result<Vec<Package>, EngineError>;
    async fn is_user_package(&self, name: &str, owner: &str) -> Result<bool, EngineError>;

    async fn add_download(&self, name: &str, version: Option<&str>) -> Result<(), EngineError>;
    async fn get_download_stats(&self, name: &str) -> Result<Option<DownloadStats>, EngineError>;

    /// The full package records served to a mirror. Defaults to
    /// `get_all_packages` — overridable by a store backed by something
    /// other than local storage, where a bulk dump might be a cheaper
    /// single call than N individual reads.
    async fn get_package_dump(&self) -> Result<Vec<Package>, EngineError> {
        self.get_all_packages().await
    }
}
