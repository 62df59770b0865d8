//! Version-info resolver.

use crate::errors::EngineError;
use crate::recipe::{parser_for, RecipeParser};
use crate::repository::{Ref, RepositoryDriver};
use chrono::{DateTime, Utc};

pub struct VersionInfo {
    pub date: DateTime<Utc>,
    pub sha: String,
    pub doc: serde_json::Value,
}

/// Try the preferred filename first, then the configured candidates in
/// order (skipping the preferred one to avoid reading it twice), reading
/// at the given reference's commit. File-not-found is silent; any other
/// read error propagates. The winning filename is recorded on the
/// returned document under `packageDescriptionFile`.
pub async fn resolve_version_info(
    repo: &dyn RepositoryDriver,
    reference: &Ref,
    preferred_filename: Option<&str>,
    recipe_filenames: &[String],
    parsers: &[Box<dyn RecipeParser>],
) -> Result<VersionInfo, EngineError> {
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(preferred) = preferred_filename {
        candidates.push(preferred);
    }
    for filename in recipe_filenames {
        if Some(filename.as_str()) != preferred_filename {
            candidates.push(filename);
        }
    }

    for filename in candidates {
        match repo.read_file(&reference.sha, filename).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| EngineError::RecipeParse {
                    file: filename.to_string(),
                    message: e.to_string(),
                })?;
                let parser = parser_for(parsers, filename).ok_or_else(|| EngineError::RecipeParse {
                    file: filename.to_string(),
                    message: "no parser registered for this filename".to_string(),
                })?;
                let mut doc = parser.parse(&text, filename)?;
                if let Some(obj) = doc.as_object_mut() {
                    obj.insert(
                        "packageDescriptionFile".to_string(),
                        serde_json::Value::String(filename.to_string()),
                    );
                }
                return Ok(VersionInfo {
                    date: reference.date,
                    sha: reference.sha.clone(),
                    doc,
                });
            }
            None => continue,
        }
    }

    Err(EngineError::Validation(
        "Found no package description file in the repository.".to_string(),
    ))
}
