use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// A uniquely named directory that is removed, recursively, when dropped.
///
/// Every sandboxed run owns exactly one of these; tying removal to `Drop`
/// means the directory goes away on normal completion, on timeout, and when
/// an error unwinds out of the caller.
#[derive(Debug)]
pub struct ScopedDir {
    path: PathBuf,
}

impl ScopedDir {
    pub fn new(prefix: &str) -> Result<Self> {
        Self::new_in(&std::env::temp_dir(), prefix)
    }

    pub fn new_in(base: &Path, prefix: &str) -> Result<Self> {
        ensure_safe_prefix(prefix)?;

        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let pid = std::process::id();

        for _ in 0..10_000 {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = base.join(format!("{prefix}_{pid}_{n}"));
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    restrict_to_owner(&path)?;
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("create temp dir: {}", path.display()))
                }
            }
        }
        anyhow::bail!("failed to create unique temp dir under {}", base.display())
    }

    /// Creates a fresh directory and copies the whole of `tree` into it.
    ///
    /// On a failed copy the partially populated directory is dropped, and
    /// therefore removed, before the error is returned.
    pub fn seeded_from(tree: &Path, prefix: &str) -> Result<Self> {
        Self::seeded_from_in(&std::env::temp_dir(), tree, prefix)
    }

    pub fn seeded_from_in(base: &Path, tree: &Path, prefix: &str) -> Result<Self> {
        let md = std::fs::metadata(tree)
            .with_context(|| format!("stat source tree: {}", tree.display()))?;
        if !md.is_dir() {
            anyhow::bail!("source tree is not a directory: {}", tree.display());
        }

        let dir = Self::new_in(base, prefix)?;
        copy_dir_contents(tree, dir.path())
            .with_context(|| format!("seed {} from {}", dir.path().display(), tree.display()))?;
        debug!(tree = %tree.display(), dir = %dir.path().display(), "seeded scoped dir");
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.path.display(), %err, "failed to remove scoped dir");
            }
        }
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .with_context(|| format!("chmod 0700: {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

fn ensure_safe_prefix(prefix: &str) -> Result<()> {
    let ok = !prefix.is_empty()
        && prefix.len() <= 64
        && prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !ok {
        anyhow::bail!("invalid temp dir prefix {prefix:?} (expected [A-Za-z0-9_-]{{1,64}})");
    }
    Ok(())
}

pub(crate) fn copy_dir_contents(src_dir: &Path, dst_dir: &Path) -> Result<()> {
    for entry in
        std::fs::read_dir(src_dir).with_context(|| format!("read_dir: {}", src_dir.display()))?
    {
        let entry = entry.context("read_dir entry")?;
        let file_type = entry.file_type().context("file_type")?;
        let src_path = entry.path();
        let dst_path = dst_dir.join(entry.file_name());
        copy_tree(&src_path, &dst_path, &file_type)?;
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path, src_type: &std::fs::FileType) -> Result<()> {
    if src_type.is_dir() {
        std::fs::create_dir(dst).with_context(|| format!("create_dir: {}", dst.display()))?;
        return copy_dir_contents(src, dst);
    }
    if src_type.is_file() {
        std::fs::copy(src, dst)
            .with_context(|| format!("copy file from {} to {}", src.display(), dst.display()))?;
        return Ok(());
    }
    // Symlinks may point outside the project tree; sockets and fifos have no
    // meaning in a copy.
    debug!(path = %src.display(), "skipping non-regular tree entry");
    Ok(())
}

pub fn ensure_safe_rel_path(rel: &Path) -> Result<()> {
    if rel.as_os_str().is_empty() {
        anyhow::bail!("expected safe relative path, got an empty path");
    }
    if rel.is_absolute() {
        anyhow::bail!("expected safe relative path, got {}", rel.display());
    }
    for c in rel.components() {
        match c {
            Component::Normal(_) => {}
            _ => anyhow::bail!("expected safe relative path, got {}", rel.display()),
        }
    }
    Ok(())
}
