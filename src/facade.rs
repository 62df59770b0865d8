//! Registry facade (§4.F): the public operation surface, generalized
//! from the teacher's `handlers/registry.rs` direct-to-index calls
//! (`publish`, `yank`, `unyank`, `download`, `search`) into facade
//! methods that also drive the update queue and the cache discipline —
//! "any operation that writes to a package or its versions invalidates
//! the cached view for that package's name".

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::cache::ViewCache;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::model::{DownloadStats, Package, PackageId, Version};
use crate::queue::{Reconcile, UpdateQueue};
use crate::recipe::{default_parsers, RecipeParser};
use crate::reconciler;
use crate::repository::RepositoryDriverFactory;
use crate::repository_validator::validate_repository;
use crate::store::PackageStore;

/// Formats a stored version string the way the repository driver expects
/// it back as an argument: tags get their `v` prefix restored, branch
/// markers are passed through as-is. Used for both `getDownloadUrl` and
/// `download`.
fn driver_version_arg(version: &str) -> String {
    if version.starts_with('~') {
        version.to_string()
    } else {
        format!("v{}", version)
    }
}

struct ReconcileAdapter {
    store: Arc<dyn PackageStore>,
    repo_factory: Arc<dyn RepositoryDriverFactory>,
    config: EngineConfig,
    parsers: Vec<Box<dyn RecipeParser>>,
    cache: Arc<ViewCache>,
}

#[async_trait]
impl Reconcile for ReconcileAdapter {
    async fn reconcile(&self, name: &str) {
        reconciler::check_for_new_versions(
            name,
            self.store.as_ref(),
            self.repo_factory.as_ref(),
            &self.config,
            &self.parsers,
            &self.cache,
        )
        .await;
    }
}

pub struct Registry {
    store: Arc<dyn PackageStore>,
    repo_factory: Arc<dyn RepositoryDriverFactory>,
    config: EngineConfig,
    parsers: Vec<Box<dyn RecipeParser>>,
    cache: Arc<ViewCache>,
    queue: Arc<UpdateQueue>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn PackageStore>,
        repo_factory: Arc<dyn RepositoryDriverFactory>,
        config: EngineConfig,
    ) -> Self {
        let cache = Arc::new(ViewCache::new());
        let reconciler = Arc::new(ReconcileAdapter {
            store: store.clone(),
            repo_factory: repo_factory.clone(),
            config: config.clone(),
            parsers: default_parsers(),
            cache: cache.clone(),
        });
        let queue = Arc::new(UpdateQueue::new(&config, reconciler));
        Registry {
            store,
            repo_factory,
            config,
            parsers: default_parsers(),
            cache,
            queue,
        }
    }

    pub async fn add_package(
        &self,
        repository: serde_json::Value,
        owner: &str,
    ) -> Result<String, EngineError> {
        let repo = self.repo_factory.open(&repository).await?;
        let name = validate_repository(repo.as_ref(), &self.config, &self.parsers).await?;
        let package = Package::new(owner, name.clone(), repository);
        self.store.add_package(package).await?;
        self.cache.invalidate(&name);
        self.queue.clone().trigger_package_update(&name).await;
        Ok(name)
    }

    pub async fn remove_package(&self, name: &str, owner: &str) -> Result<(), EngineError> {
        self.store.remove_package(name, owner).await?;
        self.cache.invalidate(name);
        Ok(())
    }

    /// Upsert keyed by id — the mirror reconciler's write path.
    pub async fn add_or_set_package(&self, package: Package) -> Result<(), EngineError> {
        let name = package.name.clone();
        self.store.add_or_set_package(package).await?;
        self.cache.invalidate(&name);
        Ok(())
    }

    pub async fn set_package_categories(
        &self,
        name: &str,
        categories: Vec<String>,
    ) -> Result<(), EngineError> {
        self.store.set_package_categories(name, categories).await?;
        self.cache.invalidate(name);
        Ok(())
    }

    /// Renames are not supported: the repository's derived name must
    /// match the package's existing name.
    pub async fn set_package_repository(
        &self,
        name: &str,
        repository: serde_json::Value,
    ) -> Result<(), EngineError> {
        let repo = self.repo_factory.open(&repository).await?;
        let derived = validate_repository(repo.as_ref(), &self.config, &self.parsers).await?;
        if derived != name {
            return Err(EngineError::Validation(format!(
                "Repository resolves to package name `{}`, but `{}` was expected; \
                 renames are not supported.",
                derived, name
            )));
        }
        self.store.set_package_repository(name, repository).await?;
        self.cache.invalidate(name);
        self.queue.clone().trigger_package_update(name).await;
        Ok(())
    }

    pub async fn add_download(&self, name: &str, version: Option<&str>) -> Result<(), EngineError> {
        self.store.add_download(name, version).await
    }

    pub async fn get_packages(&self, owner: &str) -> Result<Vec<Package>, EngineError> {
        self.store.get_user_packages(owner).await
    }

    pub async fn is_user_package(&self, name: &str, owner: &str) -> Result<bool, EngineError> {
        self.store.is_user_package(name, owner).await
    }

    /// Pass-through to the store; no ranking or full-text search lives
    /// in this engine.
    pub async fn search_packages(&self, query: &str) -> Result<Vec<Package>, EngineError> {
        self.store.search_packages(query).await
    }

    /// `include_errors = false` returns (and populates) the cached view.
    /// `include_errors = true` always rebuilds and never caches — the
    /// error list reflects only the most recent reconciliation and
    /// caching it would let a stale errors array outlive its run.
    pub async fn get_package_info(
        &self,
        name: &str,
        include_errors: bool,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        if !include_errors {
            if let Some(view) = self.cache.get(name) {
                return Ok(Some(view));
            }
        }

        let package = match self.store.get_package(name).await? {
            Some(p) => p,
            None => return Ok(None),
        };
        let view = self.build_view(&package, include_errors).await?;

        if !include_errors {
            self.cache.put(name, view.clone());
        }
        Ok(Some(view))
    }

    async fn build_view(&self, package: &Package, include_errors: bool) -> Result<serde_json::Value, EngineError> {
        let repo = self.repo_factory.open(&package.repository).await.ok();

        let mut versions = Vec::with_capacity(package.versions.len());
        for version in &package.versions {
            versions.push(self.build_version_view(repo.as_deref(), version).await);
        }

        let mut view = json!({
            "id": package.id.as_str(),
            "dateAdded": package.id.created_at().map(|d| d.to_rfc3339()),
            "owner": package.owner,
            "name": package.name,
            "repository": package.repository,
            "categories": package.categories,
            "versions": versions,
        });
        if include_errors {
            view["errors"] = json!(package.errors);
        }
        Ok(view)
    }

    async fn build_version_view(
        &self,
        repo: Option<&dyn crate::repository::RepositoryDriver>,
        version: &Version,
    ) -> serde_json::Value {
        let mut doc = version.recipe.clone();
        let url = match repo {
            Some(repo) => repo
                .get_download_url(&driver_version_arg(&version.version))
                .await
                .unwrap_or_default(),
            None => String::new(),
        };

        if let Some(obj) = doc.as_object_mut() {
            obj.insert("version".to_string(), json!(version.version));
            obj.insert("date".to_string(), json!(version.date.to_rfc3339()));
            obj.insert("url".to_string(), json!(url));

            if let (Some(repo), Some(path)) = (repo, &version.readme_path) {
                if path.len() < 256 && path.starts_with('/') {
                    if let Ok(Some(bytes)) = repo.read_file(&version.commit, path).await {
                        if let Ok(text) = String::from_utf8(bytes) {
                            obj.insert("readme".to_string(), json!(text));
                        }
                    }
                }
            }
        }
        doc
    }

    /// `Some(version)` substitutes `"latest"` for the package's current
    /// latest tagged release, returning `None` if there isn't one.
    pub async fn get_package_stats(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<u64>, EngineError> {
        let resolved = match version {
            Some("latest") => match self.store.get_latest_version(name).await? {
                Some(v) => Some(v.version),
                None => return Ok(None),
            },
            Some(v) => Some(v.to_string()),
            None => None,
        };

        let stats = self.store.get_download_stats(name).await?;
        Ok(match (stats, resolved) {
            (Some(s), Some(v)) => Some(*s.by_version.get(&v).unwrap_or(&0)),
            (Some(s), None) => Some(s.total),
            (None, _) => None,
        })
    }

    pub async fn get_package_version_info(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<Version>, EngineError> {
        self.store.get_version_info(name, version).await
    }

    pub async fn get_latest_version(&self, name: &str) -> Result<Option<Version>, EngineError> {
        self.store.get_latest_version(name).await
    }

    pub async fn download_package_zip(&self, name: &str, version: &str) -> Result<Vec<u8>, EngineError> {
        let package = self.store.get_package(name).await?.ok_or(EngineError::NotFound)?;
        let repo = self.repo_factory.open(&package.repository).await?;
        self.store.add_download(name, Some(version)).await?;
        repo.download(&driver_version_arg(version)).await
    }

    pub async fn trigger_package_update(&self, name: &str) {
        self.queue.clone().trigger_package_update(name).await;
    }

    pub async fn is_package_scheduled_for_update(&self, name: &str) -> bool {
        self.queue.is_scheduled(name).await
    }

    pub async fn get_update_queue_position(&self, name: &str) -> i64 {
        self.queue.queue_position(name).await
    }

    /// Full rescan of every known package, bypassing the queue. Intended
    /// for the external trigger the reference design expects on process
    /// restart, since the queue itself starts empty every time.
    pub async fn check_for_new_versions_all(&self) {
        let packages = match self.store.get_all_packages().await {
            Ok(p) => p,
            Err(e) => {
                log::error!("Failed to list packages for a full rescan: {}", e);
                return;
            }
        };
        for package in packages {
            reconciler::check_for_new_versions(
                &package.name,
                self.store.as_ref(),
                self.repo_factory.as_ref(),
                &self.config,
                &self.parsers,
                &self.cache,
            )
            .await;
        }
    }

    pub async fn get_all_package_ids(&self) -> Result<Vec<PackageId>, EngineError> {
        self.store.get_all_package_ids().await
    }

    pub async fn get_download_stats(&self, name: &str) -> Result<Option<DownloadStats>, EngineError> {
        self.store.get_download_stats(name).await
    }
}
