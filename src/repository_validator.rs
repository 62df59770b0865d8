//! Repository validator, used when a user submits a new repository
//! descriptor (`addPackage`/`setPackageRepository`).

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::recipe::RecipeParser;
use crate::repository::RepositoryDriver;
use crate::validation::validate_recipe;
use crate::version_info::resolve_version_info;
use crate::versioning::is_valid_version_tag;

/// Validates a repository descriptor end to end: branches are tried in
/// order (`master` first if present), and the first one that yields a
/// parseable, valid recipe wins; at least one tag must also look like a
/// SemVer release. Returns the recipe's `name` as the canonical package
/// name on success.
pub async fn validate_repository(
    repo: &dyn RepositoryDriver,
    config: &EngineConfig,
    parsers: &[Box<dyn RecipeParser>],
) -> Result<String, EngineError> {
    let mut branches = repo.get_branches().await?;
    if branches.is_empty() {
        return Err(EngineError::Validation(
            "Repository has no branches.".to_string(),
        ));
    }

    if let Some(pos) = branches.iter().position(|b| b.name == "master") {
        let master = branches.remove(pos);
        branches.insert(0, master);
    }

    let mut per_branch_errors = Vec::new();
    let mut canonical_name = None;

    for branch in &branches {
        let outcome = resolve_version_info(repo, branch, None, &config.recipe_filenames, parsers)
            .await
            .and_then(|info| {
                validate_recipe(&info.doc, config.max_name_length)?;
                Ok(info.doc["name"]
                    .as_str()
                    .expect("validate_recipe guarantees a string `name` field")
                    .to_string())
            });

        match outcome {
            Ok(name) => {
                canonical_name = Some(name);
                break;
            }
            Err(e) => per_branch_errors.push(format!("`{}`: {}", branch.name, e)),
        }
    }

    let name = canonical_name.ok_or_else(|| {
        EngineError::Validation(format!(
            "No branch yielded a valid recipe. {}",
            per_branch_errors.join("; ")
        ))
    })?;

    let tags = repo.get_tags().await?;
    if !tags.iter().any(|t| is_valid_version_tag(&t.name)) {
        return Err(EngineError::Validation(
            "Repository must have at least one tagged version, e.g. create a tag named \
             `v1.0.0` following Semantic Versioning."
                .to_string(),
        ));
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::default_parsers;
    use crate::repository::mock::MockRepositoryDriver;
    use chrono::Utc;

    fn recipe(name: &str) -> String {
        format!(r#"{{"name": "{}", "description": "d", "license": "MIT"}}"#, name)
    }

    #[actix_rt::test]
    async fn test_validate_repository_happy_path() {
        let now = Utc::now();
        let driver = MockRepositoryDriver::new()
            .with_branch("master", "sha1", now)
            .with_tag("v1.0.0", "sha1", now)
            .with_file("sha1", "package.json", &recipe("foo"));

        let name = validate_repository(&driver, &EngineConfig::default(), &default_parsers())
            .await
            .unwrap();
        assert_eq!("foo", name);
    }

    #[actix_rt::test]
    async fn test_validate_repository_prefers_master() {
        let now = Utc::now();
        let driver = MockRepositoryDriver::new()
            .with_branch("develop", "sha-dev", now)
            .with_branch("master", "sha-master", now)
            .with_tag("v1.0.0", "sha-master", now)
            .with_file("sha-dev", "package.json", &recipe("from-develop"))
            .with_file("sha-master", "package.json", &recipe("from-master"));

        let name = validate_repository(&driver, &EngineConfig::default(), &default_parsers())
            .await
            .unwrap();
        assert_eq!("from-master", name);
    }

    #[actix_rt::test]
    async fn test_validate_repository_requires_branches() {
        let driver = MockRepositoryDriver::new();
        assert!(validate_repository(&driver, &EngineConfig::default(), &default_parsers())
            .await
            .is_err());
    }

    #[actix_rt::test]
    async fn test_validate_repository_requires_semver_tag() {
        let now = Utc::now();
        let driver = MockRepositoryDriver::new()
            .with_branch("master", "sha1", now)
            .with_tag("vbogus", "sha1", now)
            .with_file("sha1", "package.json", &recipe("foo"));

        let err = validate_repository(&driver, &EngineConfig::default(), &default_parsers())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must have at least one tagged version"));
    }

    #[actix_rt::test]
    async fn test_validate_repository_fails_when_no_branch_has_valid_recipe() {
        let now = Utc::now();
        let driver = MockRepositoryDriver::new()
            .with_branch("master", "sha1", now)
            .with_tag("v1.0.0", "sha1", now);

        assert!(validate_repository(&driver, &EngineConfig::default(), &default_parsers())
            .await
            .is_err());
    }
}
