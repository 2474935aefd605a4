use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Read-only view of the surrounding platform's project storage.
///
/// Tree lookups return `Ok(None)` for projects that do not exist.
pub trait ProjectStore {
    fn source_tree(&self, project_id: &str) -> Result<Option<PathBuf>>;
    fn migrated_tree(&self, project_id: &str) -> Result<Option<PathBuf>>;
    fn is_file_migrated(&self, project_id: &str, file_path: &Path) -> Result<bool>;
}

/// Projects laid out on disk as `<root>/<id>/{source,migrated,state.json}`.
#[derive(Debug, Clone)]
pub struct DirProjectStore {
    root: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectState {
    #[serde(default)]
    files: BTreeMap<String, FileState>,
}

#[derive(Debug, Default, Deserialize)]
struct FileState {
    #[serde(default)]
    migrated: bool,
}

impl DirProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project_id: &str) -> Result<PathBuf> {
        if !is_safe_project_id(project_id) {
            anyhow::bail!("invalid project id: {project_id:?}");
        }
        Ok(self.root.join(project_id))
    }

    fn tree(&self, project_id: &str, name: &str) -> Result<Option<PathBuf>> {
        let dir = self.project_dir(project_id)?.join(name);
        Ok(dir.is_dir().then_some(dir))
    }

    fn load_state(&self, project_id: &str) -> Result<ProjectState> {
        let path = self.project_dir(project_id)?.join("state.json");
        let txt = match std::fs::read_to_string(&path) {
            Ok(txt) => txt,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProjectState::default())
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read project state: {}", path.display()))
            }
        };
        serde_json::from_str(&txt)
            .with_context(|| format!("parse project state JSON: {}", path.display()))
    }
}

impl ProjectStore for DirProjectStore {
    fn source_tree(&self, project_id: &str) -> Result<Option<PathBuf>> {
        self.tree(project_id, "source")
    }

    fn migrated_tree(&self, project_id: &str) -> Result<Option<PathBuf>> {
        self.tree(project_id, "migrated")
    }

    fn is_file_migrated(&self, project_id: &str, file_path: &Path) -> Result<bool> {
        let state = self.load_state(project_id)?;
        Ok(state
            .files
            .get(&state_key(file_path))
            .is_some_and(|f| f.migrated))
    }
}

// state.json keys always use '/' separators.
fn state_key(file_path: &Path) -> String {
    file_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn is_safe_project_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, DirProjectStore) {
        let root = tempfile::tempdir().expect("tempdir");
        let proj = root.path().join("demo");
        std::fs::create_dir_all(proj.join("source/pkg")).expect("mkdir");
        std::fs::create_dir_all(proj.join("migrated")).expect("mkdir");
        std::fs::write(
            proj.join("state.json"),
            r#"{"name":"demo","files":{"main.py":{"lines":3,"migrated":true},"pkg/util.py":{"lines":9,"migrated":false,"dead_code":[]}}}"#,
        )
        .expect("write state");
        let store = DirProjectStore::new(root.path());
        (root, store)
    }

    #[test]
    fn trees_resolve_for_known_projects() {
        let (_root, store) = fixture();
        assert!(store.source_tree("demo").expect("lookup").is_some());
        assert!(store.migrated_tree("demo").expect("lookup").is_some());
        assert!(store.source_tree("other").expect("lookup").is_none());
    }

    #[test]
    fn migrated_flags_come_from_state() {
        let (_root, store) = fixture();
        assert!(store.is_file_migrated("demo", Path::new("main.py")).expect("state"));
        assert!(!store
            .is_file_migrated("demo", Path::new("pkg/util.py"))
            .expect("state"));
        assert!(!store
            .is_file_migrated("demo", Path::new("missing.py"))
            .expect("state"));
    }

    #[test]
    fn missing_state_means_nothing_migrated() {
        let (root, store) = fixture();
        std::fs::remove_file(root.path().join("demo/state.json")).expect("rm");
        assert!(!store.is_file_migrated("demo", Path::new("main.py")).expect("state"));
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let (root, store) = fixture();
        std::fs::write(root.path().join("demo/state.json"), "{nope").expect("write");
        assert!(store.is_file_migrated("demo", Path::new("main.py")).is_err());
    }

    #[test]
    fn project_ids_are_single_components() {
        assert!(is_safe_project_id("proj_01-a"));
        assert!(!is_safe_project_id(""));
        assert!(!is_safe_project_id(".."));
        assert!(!is_safe_project_id("a/b"));
        assert!(!is_safe_project_id(&"x".repeat(65)));
        let (_root, store) = fixture();
        assert!(store.source_tree("../demo").is_err());
    }
}
