//! Ancestor chain of relative paths for a file inside a project root.
//!
//! The project root itself is never part of the chain: a file at
//! `root/a/b/c.ext` resolves to `[a, a/b, a/b/c.ext]`.

use crate::model::PathIdentity;
use std::path::{Component, Path};

/// Resolve the root-to-leaf chain for `absolute_path`.
///
/// Files outside `project_root` (including paths that climb out with `..`)
/// degrade to a single entry holding the base name. A path equal to the
/// root yields an empty chain. Purely lexical, no filesystem access.
pub fn resolve(absolute_path: &Path, project_root: &Path) -> Vec<PathIdentity> {
    let Some(segments) = relative_segments(absolute_path, project_root) else {
        return vec![PathIdentity::new(base_name(absolute_path))];
    };

    let mut chain = Vec::with_capacity(segments.len());
    let mut current = String::new();
    for segment in segments {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(&segment);
        chain.push(PathIdentity::new(current.clone()));
    }
    chain
}

fn relative_segments(absolute_path: &Path, project_root: &Path) -> Option<Vec<String>> {
    let rel = absolute_path.strip_prefix(project_root).ok()?;
    let mut segments = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(os) => segments.push(os.to_string_lossy().replace('\\', "/")),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(segments)
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ids(values: &[&str]) -> Vec<PathIdentity> {
        values.iter().map(|value| PathIdentity::from(*value)).collect()
    }

    #[test]
    fn nested_file_yields_increasing_specificity() {
        let chain = resolve(Path::new("/repo/a/b/c.ext"), Path::new("/repo"));
        assert_eq!(chain, ids(&["a", "a/b", "a/b/c.ext"]));
    }

    #[test]
    fn file_directly_under_root() {
        let chain = resolve(Path::new("/repo/README.md"), Path::new("/repo"));
        assert_eq!(chain, ids(&["README.md"]));
    }

    #[test]
    fn outside_root_degrades_to_base_name() {
        let chain = resolve(Path::new("/elsewhere/notes.txt"), Path::new("/repo"));
        assert_eq!(chain, ids(&["notes.txt"]));

        // Sibling directory sharing a string prefix is still outside.
        let chain = resolve(Path::new("/repo2/src/x.rs"), Path::new("/repo"));
        assert_eq!(chain, ids(&["x.rs"]));
    }

    #[test]
    fn parent_dir_escape_is_outside() {
        let chain = resolve(Path::new("/repo/../etc/passwd"), Path::new("/repo"));
        assert_eq!(chain, ids(&["passwd"]));
    }

    #[test]
    fn root_itself_is_empty() {
        assert!(resolve(Path::new("/repo"), Path::new("/repo")).is_empty());
    }

    #[test]
    fn current_dir_components_are_dropped() {
        let root = PathBuf::from("/work/repo");
        assert_eq!(
            resolve(&root.join(".").join("src").join("a.ts"), &root),
            ids(&["src", "src/a.ts"])
        );
    }
}
