//! Object storage paths of the form `projectId:/path...`.

use tenantgate_core_types::{GateError, GateResult, ProjectId};
use tracing::warn;

use crate::reserved::is_reserved_segment;

pub const MAX_PATH_LEN: usize = 500;
pub const MAX_SCOPED_PATH_LEN: usize = 600;

const INVALID_CHARACTERS: &[char] = &['\0', '<', '>', ':', '|', '?', '*'];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedPath {
    pub project_id: ProjectId,
    pub path: String,
}

impl ParsedPath {
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path[1..].split('/')
    }
}

fn format_error(message: &str) -> GateError {
    GateError::InvalidPathFormat(message.to_string())
}

/// Structural validation only. Traversal and character checks run first and
/// never look at the project id.
pub fn parse_path(scoped_path: &str) -> GateResult<ParsedPath> {
    let split = scoped_path.split_once(':');
    let path = split.map(|(_, path)| path).unwrap_or(scoped_path);

    if path.contains("..") || path.contains('\\') {
        return Err(GateError::PathTraversalDetected);
    }
    if path.contains(INVALID_CHARACTERS) {
        return Err(GateError::InvalidPathCharacter);
    }

    let Some((raw_project, path)) = split else {
        return Err(format_error("expected projectId:/path"));
    };
    if !path.starts_with('/') {
        return Err(format_error("path must start with '/'"));
    }
    if path.len() > MAX_PATH_LEN || scoped_path.len() > MAX_SCOPED_PATH_LEN {
        return Err(format_error("path is too long"));
    }
    if path[1..].split('/').any(is_reserved_segment) {
        return Err(format_error("path uses a reserved or empty segment"));
    }

    let project_id =
        ProjectId::parse(raw_project).ok_or_else(|| format_error("path project id is not a uuid"))?;

    Ok(ParsedPath {
        project_id,
        path: path.to_string(),
    })
}

/// Confirms `scoped_path` is well formed and owned by `caller`.
pub fn assert_path(scoped_path: &str, caller: Option<&ProjectId>) -> GateResult<ParsedPath> {
    let parsed = parse_path(scoped_path)?;
    let Some(caller) = caller else {
        return Err(GateError::MissingProjectId);
    };
    if parsed.project_id != *caller {
        warn!(
            target: "isolation-guards",
            caller = %caller,
            path_project = %parsed.project_id,
            "cross-project storage path denied"
        );
        return Err(GateError::CrossProjectPath);
    }
    Ok(parsed)
}

/// Scopes `path` to `project` and validates the result through [`assert_path`].
pub fn build_path(project: &ProjectId, path: &str) -> GateResult<String> {
    let scoped = format!("{project}:{path}");
    assert_path(&scoped, Some(project))?;
    Ok(scoped)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PID: &str = "11111111-1111-1111-1111-111111111111";

    fn pid() -> ProjectId {
        ProjectId::parse(PID).unwrap()
    }

    #[test]
    fn nested_paths_build() {
        let scoped = build_path(&pid(), "/uploads/2024/avatar.final.png").unwrap();
        let parsed = parse_path(&scoped).unwrap();
        assert_eq!(
            parsed.segments().collect::<Vec<_>>(),
            vec!["uploads", "2024", "avatar.final.png"]
        );
    }

    #[test]
    fn traversal_wins_over_every_other_error() {
        for raw in ["../etc/passwd", "/a/../b", "/a\\b", "..", "no-slash/.."] {
            assert_eq!(
                build_path(&pid(), raw).unwrap_err(),
                GateError::PathTraversalDetected,
                "path {raw}"
            );
        }
        assert_eq!(
            assert_path("not-a-project:/x/../y", None).unwrap_err(),
            GateError::PathTraversalDetected
        );
    }

    #[test]
    fn invalid_characters_are_rejected() {
        for raw in ["/a<b", "/a>b", "/a|b", "/a?b", "/a*b", "/a:b", "/a\0b"] {
            assert_eq!(
                build_path(&pid(), raw).unwrap_err(),
                GateError::InvalidPathCharacter,
                "path {raw:?}"
            );
        }
    }

    #[test]
    fn structure_is_checked_before_identity() {
        let other = ProjectId::new_random();
        for scoped in [
            format!("{PID}uploads"),
            format!("{PID}:uploads/a.png"),
            format!("{PID}:/uploads//a.png"),
            format!("{PID}:/uploads/"),
            format!("{PID}:/"),
            format!("{PID}:/./a"),
            format!("{PID}:/Admin/a"),
            format!("{PID}:/{}", "a".repeat(MAX_PATH_LEN)),
            "project:/uploads/a.png".to_string(),
        ] {
            let err = assert_path(&scoped, Some(&other)).unwrap_err();
            assert_eq!(err.code(), "INVALID_PATH_FORMAT", "path {scoped}");
        }
    }

    #[test]
    fn missing_caller_is_an_identity_error() {
        let scoped = build_path(&pid(), "/a.png").unwrap();
        assert_eq!(
            assert_path(&scoped, None).unwrap_err(),
            GateError::MissingProjectId
        );
    }
}
