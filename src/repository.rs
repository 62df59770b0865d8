//! Repository driver.
//!
//! Resolves a repository descriptor to tags, branches, file reads, and
//! download URLs. `GitRepositoryDriver` generalizes the teacher's own use
//! of `git2::Repository` (`package_index.rs`'s `get_or_create_repo`,
//! `add_and_commit_file`) from "the one local index repo" to "any
//! repository descriptor naming a path git2 can open".

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;

use crate::errors::EngineError;

/// A named pointer into a repository (tag or branch tip).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ref {
    pub name: String,
    pub sha: String,
    pub date: DateTime<Utc>,
}

/// Enumerates branches and tags, reads files at a given commit, and
/// resolves download locations for a repository. `read_file` returns
/// `Ok(None)` for file-not-found, which callers treat as silent; any
/// other `Err` propagates.
#[async_trait]
pub trait RepositoryDriver: Send + Sync {
    async fn get_branches(&self) -> Result<Vec<Ref>, EngineError>;
    async fn get_tags(&self) -> Result<Vec<Ref>, EngineError>;
    async fn read_file(&self, sha: &str, path: &str) -> Result<Option<Vec<u8>>, EngineError>;
    async fn download(&self, version: &str) -> Result<Vec<u8>, EngineError>;
    async fn get_download_url(&self, version: &str) -> Result<String, EngineError>;
}

/// Opens a `RepositoryDriver` for a stored repository descriptor.
/// Separated from the driver trait itself because a descriptor needs
/// resolving (cloning/opening a repo) before any of its operations can
/// run, and that resolution step is itself fallible and I/O-bound.
#[async_trait]
pub trait RepositoryDriverFactory: Send + Sync {
    async fn open(&self, descriptor: &serde_json::Value) -> Result<Box<dyn RepositoryDriver>, EngineError>;
}

/// Opens local git repositories by path. The descriptor shape is
/// `{ "path": "/abs/path/to/repo", "download_url_template": "..." }`,
/// where `download_url_template` has a single `{version}` placeholder.
pub struct GitRepositoryDriverFactory;

#[async_trait]
impl RepositoryDriverFactory for GitRepositoryDriverFactory {
    async fn open(&self, descriptor: &serde_json::Value) -> Result<Box<dyn RepositoryDriver>, EngineError> {
        let path = descriptor
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::Repository("descriptor is missing `path`".to_string()))?;
        let download_url_template = descriptor
            .get("download_url_template")
            .and_then(|v| v.as_str())
            .unwrap_or("{path}/{version}")
            .to_string();
        let repo = git2::Repository::open(path)?;
        Ok(Box::new(GitRepositoryDriver {
            repo: Mutex::new(repo),
            download_url_template,
        }))
    }
}

/// `git2`-backed driver. `git2::Repository` is `Send` but not `Sync`;
/// wrapping it in a `Mutex` gives us both, matching how the teacher
/// guards its one shared `PackageIndex` in `main.rs` with a
/// `web::Data<Mutex<PackageIndex>>`.
pub struct GitRepositoryDriver {
    repo: Mutex<git2::Repository>,
    download_url_template: String,
}

impl GitRepositoryDriver {
    fn refs(&self, prefix: &str) -> Result<Vec<Ref>, EngineError> {
        let repo = self.repo.lock().unwrap();
        let mut out = Vec::new();
        for name in repo.references_glob(&format!("{}*", prefix))?.names() {
            let name = name?;
            let short_name = name.trim_start_matches(prefix).to_string();
            let reference = repo.find_reference(name)?;
            let commit = reference.peel_to_commit()?;
            let sha = commit.id().to_string();
            let date = Utc
                .timestamp_opt(commit.time().seconds(), 0)
                .single()
                .unwrap_or_else(Utc::now);
            out.push(Ref {
                name: short_name,
                sha,
                date,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl RepositoryDriver for GitRepositoryDriver {
    async fn get_branches(&self) -> Result<Vec<Ref>, EngineError> {
        self.refs("refs/heads/")
    }

    async fn get_tags(&self) -> Result<Vec<Ref>, EngineError> {
        self.refs("refs/tags/")
    }

    async fn read_file(&self, sha: &str, path: &str) -> Result<Option<Vec<u8>>, EngineError> {
        let repo = self.repo.lock().unwrap();
        let oid = git2::Oid::from_str(sha)?;
        let commit = repo.find_commit(oid)?;
        let tree = commit.tree()?;
        match tree.get_path(std::path::Path::new(path)) {
            Ok(entry) => {
                let blob = repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn download(&self, version: &str) -> Result<Vec<u8>, EngineError> {
        let url = self.get_download_url(version).await?;
        Err(EngineError::Repository(format!(
            "download is expected to be served by fetching `{}` directly; \
             the git driver does not archive working trees itself.",
            url
        )))
    }

    async fn get_download_url(&self, version: &str) -> Result<String, EngineError> {
        Ok(self.download_url_template.replace("{version}", version))
    }
}
