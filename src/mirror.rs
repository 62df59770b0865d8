//! Mirror reconciler (§4.G): pulls a full package dump from an upstream
//! registry and converges local state against it. HTTP shape grounded in
//! `release-plz-release-plz`'s `reqwest` usage pattern — a plain JSON
//! client, no bespoke wire format.

use std::collections::HashSet;
use std::future::Future;
use tokio::runtime::Runtime;

use crate::errors::EngineError;
use crate::facade::Registry;
use crate::model::Package;
use crate::store::PackageStore;

/// `reqwest` 0.12 (hyper underneath) needs a tokio 1.x reactor to drive
/// its sockets, but `validate_mirror_url`/`mirror_registry` are awaited
/// from `actix-web` 3.x handlers and `main.rs`, both running on
/// `actix-rt`'s tokio 0.2 executor. `MirrorClient` carries its own tokio
/// 1.x `Runtime` for exactly this reason — the same fix `UpdateQueue`
/// applies to its drain task (see `DESIGN.md`'s runtime-mismatch note).
pub struct MirrorClient {
    client: reqwest::Client,
    base_url: String,
    runtime: Runtime,
}

impl MirrorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        MirrorClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            runtime: Runtime::new().expect("failed to start the mirror client's tokio 1.x runtime"),
        }
    }

    /// Spawns `fut` onto the client's own tokio 1.x runtime and awaits
    /// its result from the caller's executor. Polling a `JoinHandle`
    /// doesn't itself require tokio 1.x reactor context, only running
    /// the spawned future does — so this is safe to call from an
    /// `actix-rt` handler.
    async fn on_tokio1<F, T>(&self, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, reqwest::Error>> + Send + 'static,
        T: Send + 'static,
    {
        self.runtime
            .spawn(fut)
            .await
            .map_err(|e| EngineError::Repository(format!("mirror HTTP task panicked: {}", e)))?
            .map_err(EngineError::from)
    }

    /// The URL must end with `/`; both liveness probes must respond with
    /// a status under 400.
    pub async fn validate_mirror_url(&self) -> Result<(), EngineError> {
        if !self.base_url.ends_with('/') {
            return Err(EngineError::Validation(
                "Mirror base URL must end with `/`.".to_string(),
            ));
        }
        for probe in ["packages/index.json", "api/packages/search?q=foobar"] {
            let url = format!("{}{}", self.base_url, probe);
            let client = self.client.clone();
            let probe_url = url.clone();
            let status = self
                .on_tokio1(async move { Ok(client.head(&probe_url).send().await?.status()) })
                .await?;
            if status.as_u16() >= 400 {
                return Err(EngineError::Validation(format!(
                    "Mirror liveness probe `{}` returned `{}`.",
                    url, status
                )));
            }
        }
        Ok(())
    }

    async fn fetch_dump(&self) -> Result<Vec<Package>, EngineError> {
        let url = format!("{}api/packages/dump", self.base_url);
        let client = self.client.clone();
        self.on_tokio1(async move { client.get(&url).send().await?.json::<Vec<Package>>().await })
            .await
    }
}

/// One pull cycle: fetch the upstream dump, delete local packages absent
/// from it, then upsert every upstream record. Deletions run first so a
/// renamed package can't collide with an upsert of the same name still
/// pending from a stale local record. A top-level fetch/decode failure
/// aborts the whole cycle; a failure on one package in either pass is
/// logged and does not abort the rest.
pub async fn mirror_registry(registry: &Registry, store: &dyn PackageStore, client: &MirrorClient) {
    let dump = match client.fetch_dump().await {
        Ok(d) => d,
        Err(e) => {
            log::error!("Mirror pull aborted: failed to fetch upstream dump: {}", e);
            return;
        }
    };
    let upstream_ids: HashSet<&str> = dump.iter().map(|p| p.id.as_str()).collect();

    let locals = match store.get_all_packages().await {
        Ok(p) => p,
        Err(e) => {
            log::error!("Mirror pull aborted: failed to list local packages: {}", e);
            return;
        }
    };

    for local in &locals {
        if !upstream_ids.contains(local.id.as_str()) {
            if let Err(e) = registry.remove_package(&local.name, &local.owner).await {
                log::error!(
                    "Mirror: failed to remove local package `{}` (absent upstream): {}",
                    local.name,
                    e
                );
            }
        }
    }

    for package in dump {
        let name = package.name.clone();
        if let Err(e) = registry.add_or_set_package(package).await {
            log::error!("Mirror: failed to upsert upstream package `{}`: {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::Package;
    use crate::repository::mock::{FactoryOf, MockRepositoryDriver};
    use crate::store::memory::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn registry_over(store: Arc<dyn PackageStore>) -> Registry {
        let factory: Arc<dyn crate::repository::RepositoryDriverFactory> =
            Arc::new(FactoryOf(Arc::new(MockRepositoryDriver::new())));
        Registry::new(store, factory, EngineConfig::default())
    }

    /// Exercises the convergence logic directly against a pre-built dump,
    /// standing in for `fetch_dump`'s network call (scenario S6).
    async fn converge(registry: &Registry, store: &dyn PackageStore, dump: Vec<Package>) {
        let upstream_ids: HashSet<&str> = dump.iter().map(|p| p.id.as_str()).collect();
        let locals = store.get_all_packages().await.unwrap();
        for local in &locals {
            if !upstream_ids.contains(local.id.as_str()) {
                registry.remove_package(&local.name, &local.owner).await.ok();
            }
        }
        for package in dump {
            registry.add_or_set_package(package).await.unwrap();
        }
    }

    #[actix_rt::test]
    async fn test_s6_mirror_convergence_deletes_then_upserts() {
        let store: Arc<dyn PackageStore> = Arc::new(MemoryStore::new());
        let b = Package::new("alice", "b", json!({}));
        let c = Package::new("alice", "c", json!({}));
        let d = Package::new("alice", "d", json!({}));
        store.add_package(b.clone()).await.unwrap();
        store.add_package(c.clone()).await.unwrap();
        store.add_package(d).await.unwrap();
        let registry = registry_over(store.clone());

        let a = Package::new("bob", "a", json!({}));
        let dump = vec![a.clone(), b.clone(), c.clone()];
        converge(&registry, store.as_ref(), dump).await;

        let mut ids: Vec<String> = store
            .get_all_package_ids()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.to_string())
            .collect();
        ids.sort();
        let mut expected = vec![a.id.to_string(), b.id.to_string(), c.id.to_string()];
        expected.sort();
        assert_eq!(expected, ids);
    }

    #[actix_rt::test]
    async fn test_validate_mirror_url_requires_trailing_slash() {
        let client = MirrorClient::new("http://example.test");
        let err = client.validate_mirror_url().await.unwrap_err();
        assert!(err.to_string().contains("must end with"));
    }
}
