//! Version-string grammar shared by the reconciler and the repository
//! validator: a tag version is the SemVer suffix of a `v`-prefixed tag;
//! a branch version is `~` followed by the branch name. `~~`-prefixed
//! strings are reserved and always invalid.

/// True iff `tag_name` starts with `v` and the remainder parses as a
/// valid SemVer.
pub fn is_valid_version_tag(tag_name: &str) -> bool {
    tag_to_semver(tag_name).is_some()
}

/// The SemVer embedded in a `v`-prefixed tag name, if valid.
pub fn tag_to_semver(tag_name: &str) -> Option<semver::Version> {
    let suffix = tag_name.strip_prefix('v')?;
    semver::Version::parse(suffix).ok()
}

/// The stored version string for a tag: the `v`-prefix stripped off.
pub fn tag_to_version_string(tag_name: &str) -> Option<String> {
    tag_to_semver(tag_name).map(|v| v.to_string())
}

/// The stored version string for a branch: `"~" + name`. A branch
/// literally named `~something` would produce the reserved `~~` prefix;
/// that's an internal invariant violation, not a user-facing validation
/// error, so this panics rather than returning an `Err`.
pub fn branch_to_version_string(branch_name: &str) -> String {
    assert!(
        !branch_name.starts_with('~'),
        "branch name `{}` would produce a reserved `~~`-prefixed version string",
        branch_name
    );
    format!("~{}", branch_name)
}

/// Orders tag refs by ascending SemVer precedence, not lexicographic
/// string order.
pub fn sort_tags_by_semver(tags: &mut Vec<crate::repository::Ref>) {
    tags.sort_by(|a, b| {
        let av = tag_to_semver(&a.name);
        let bv = tag_to_semver(&b.name);
        av.cmp(&bv)
    });
}
