//! Rollback restore (§4.8): reverses a captured snapshot.

use std::path::{Path, PathBuf};

use slb_common::EngineError;
use slb_store::model::RollbackData;
use tokio::process::Command;

/// Options controlling a restore attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    pub force: bool,
}

/// Restore a captured snapshot. `rollback_dir` is the directory capture
/// wrote its archive/manifests into.
pub async fn restore(data: &RollbackData, rollback_dir: &Path, opts: RestoreOptions) -> Result<(), EngineError> {
    match data {
        RollbackData::Filesystem(fs) => restore_filesystem(fs, rollback_dir, opts).await,
        RollbackData::Git(git) => restore_git(git, rollback_dir, opts).await,
        RollbackData::Kubernetes(k8s) => restore_kubernetes(k8s, rollback_dir).await,
    }
}

async fn restore_filesystem(fs: &slb_store::model::FilesystemRollback, rollback_dir: &Path, opts: RestoreOptions) -> Result<(), EngineError> {
    let archive_path = rollback_dir.join(&fs.archive_file);
    let file = std::fs::File::open(&archive_path).map_err(|e| EngineError::Other(e.to_string()))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    let entries = archive.entries().map_err(|e| EngineError::Other(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| EngineError::Other(e.to_string()))?;
        let entry_path = entry.path().map_err(|e| EngineError::Other(e.to_string()))?.into_owned();
        let mut components = entry_path.components();
        let prefix = components.next().map(|c| c.as_os_str().to_string_lossy().into_owned()).unwrap_or_default();
        let remainder: PathBuf = components.collect();

        let root = fs
            .roots
            .iter()
            .find(|r| r.id == prefix)
            .ok_or_else(|| EngineError::Other(format!("unknown rollback root prefix {prefix}")))?;
        let root_path = Path::new(&root.path);
        let destination = if remainder.as_os_str().is_empty() { root_path.to_path_buf() } else { root_path.join(&remainder) };

        ensure_no_symlink_ancestor(&destination, root_path)?;

        if destination.exists() && !opts.force && entry.header().entry_type() != tar::EntryType::Directory {
            return Err(EngineError::Other(format!("{} already exists; pass force to overwrite", destination.display())));
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Other(e.to_string()))?;
        }
        entry.unpack(&destination).map_err(|e| EngineError::Other(e.to_string()))?;
    }

    Ok(())
}

/// Refuse to restore if any ancestor directory up to (and including) `root`
/// is a symlink — prevents an archive entry from escaping the captured root
/// via a symlinked parent.
fn ensure_no_symlink_ancestor(destination: &Path, root: &Path) -> Result<(), EngineError> {
    let mut current = destination.parent();
    while let Some(dir) = current {
        if let Ok(meta) = std::fs::symlink_metadata(dir) {
            if meta.file_type().is_symlink() {
                return Err(EngineError::Other(format!("refusing to restore through symlinked ancestor {}", dir.display())));
            }
        }
        if dir == root {
            break;
        }
        current = dir.parent();
    }
    Ok(())
}

async fn restore_git(git: &slb_store::model::GitRollback, rollback_dir: &Path, opts: RestoreOptions) -> Result<(), EngineError> {
    if !opts.force {
        return Err(EngineError::Other("git rollback requires force".to_string()));
    }
    if git.repo_root.trim().is_empty() {
        return Err(EngineError::Other("rollback repo_root is empty".to_string()));
    }

    run_git(&git.repo_root, &["reset", "--hard", &git.head]).await?;

    if let Some(branch) = &git.branch {
        run_git(&git.repo_root, &["checkout", "-B", branch]).await?;
    }

    if let Some(diff_file) = &git.diff_file {
        let diff_path = rollback_dir.join(diff_file);
        let diff = std::fs::read_to_string(&diff_path).map_err(|e| EngineError::Other(e.to_string()))?;
        if !diff.trim().is_empty() {
            apply_patch(&git.repo_root, &diff_path).await?;
        }
    }

    Ok(())
}

async fn run_git(repo_root: &str, args: &[&str]) -> Result<(), EngineError> {
    let status = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .args(args)
        .status()
        .await
        .map_err(|e| EngineError::Other(format!("git {args:?} failed to spawn: {e}")))?;
    if !status.success() {
        return Err(EngineError::Other(format!("git {args:?} exited with {status}")));
    }
    Ok(())
}

async fn apply_patch(repo_root: &str, diff_path: &Path) -> Result<(), EngineError> {
    let status = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .arg("apply")
        .arg(diff_path)
        .status()
        .await
        .map_err(|e| EngineError::Other(format!("git apply failed to spawn: {e}")))?;
    if !status.success() {
        return Err(EngineError::Other("git apply exited with a failure".to_string()));
    }
    Ok(())
}

async fn restore_kubernetes(k8s: &slb_store::model::KubernetesRollback, rollback_dir: &Path) -> Result<(), EngineError> {
    for manifest in &k8s.manifests {
        let path = rollback_dir.join("manifests").join(&manifest.file);
        let status = Command::new("kubectl")
            .arg("apply")
            .arg("-f")
            .arg(&path)
            .arg("-n")
            .arg(&k8s.namespace)
            .status()
            .await
            .map_err(|e| EngineError::Other(format!("kubectl apply failed to spawn: {e}")))?;
        if !status.success() {
            return Err(EngineError::Other(format!("kubectl apply -f {} exited with {status}", path.display())));
        }
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symlinked_ancestor_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        let evil_target = dir.path().join("outside");
        std::fs::create_dir_all(&evil_target).unwrap();
        let symlinked_sub = root.join("sub");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&evil_target, &symlinked_sub).unwrap();
        #[cfg(unix)]
        {
            let destination = symlinked_sub.join("file.txt");
            assert!(ensure_no_symlink_ancestor(&destination, &root).is_err());
        }
    }

    #[test]
    fn clean_ancestor_chain_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        let destination = root.join("sub").join("file.txt");
        assert!(ensure_no_symlink_ancestor(&destination, &root).is_ok());
    }
}
