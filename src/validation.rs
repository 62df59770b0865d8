//! Name & recipe validators.

use crate::errors::EngineError;

/// A package name must be non-empty, with every character in
/// `[a-zA-Z0-9_-]`.
pub fn check_package_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::Validation(
            "Package name must not be empty.".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(EngineError::Validation(format!(
            "Package name `{}` contains characters outside `[a-zA-Z0-9_-]`.",
            name
        )));
    }
    Ok(())
}

/// Validates a parsed recipe document's required fields and shape.
/// `max_name_length` is the package name cap from `EngineConfig`, passed
/// in rather than hard-coded so it stays a single configurable surface.
pub fn validate_recipe(doc: &serde_json::Value, max_name_length: usize) -> Result<(), EngineError> {
    let obj = doc.as_object().ok_or_else(|| {
        EngineError::Validation("Recipe document must be a JSON object.".to_string())
    })?;

    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::Validation("Recipe is missing a `name` field.".to_string()))?;

    if name.is_empty() || name.chars().count() > max_name_length {
        return Err(EngineError::Validation(format!(
            "Recipe `name` must be 1-{} characters, got `{}`.",
            max_name_length, name
        )));
    }
    if name != name.to_lowercase() {
        return Err(EngineError::Validation(format!(
            "Recipe `name` must be its own lowercase form, got `{}`.",
            name
        )));
    }
    check_package_name(name)?;

    for field in ["description", "license"] {
        let value = obj.get(field).and_then(|v| v.as_str()).unwrap_or("");
        if value.is_empty() {
            return Err(EngineError::Validation(format!(
                "Recipe is missing a non-empty `{}` field.",
                field
            )));
        }
    }

    if let Some(deps) = obj.get("dependencies").and_then(|v| v.as_object()) {
        for key in deps.keys() {
            validate_dependency_path(key)?;
        }
    }

    Ok(())
}

/// A dependency key is a colon-separated path of segments, each passing
/// `check_package_name`, except that a leading empty segment (`":sub"`)
/// is permitted and means "subpackage of self".
fn validate_dependency_path(key: &str) -> Result<(), EngineError> {
    let segments: Vec<&str> = key.split(':').collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            if i == 0 && segments.len() > 1 {
                continue;
            }
            return Err(EngineError::Validation(format!(
                "Dependency key `{}` has an invalid empty segment.",
                key
            )));
        }
        check_package_name(segment).map_err(|_| {
            EngineError::Validation(format!(
                "Dependency key `{}` has an invalid segment `{}`.",
                key, segment
            ))
        })?;
    }
    Ok(())
}
