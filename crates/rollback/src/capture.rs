//! Rollback capture (§4.7): snapshots state before a destructive command
//! runs, so [`crate::restore`] has something to reverse it with.

use std::path::{Path, PathBuf};

use flate2::{write::GzEncoder, Compression};
use slb_common::EngineError;
use slb_store::model::{FilesystemRollback, GitRollback, KubernetesManifest, KubernetesRollback, RollbackData, RollbackRoot};
use tar::Builder as TarBuilder;
use tokio::process::Command;
use tracing::warn;

use crate::sanitize::sanitize_filename;

/// Capture a filesystem snapshot for the targets of an `rm` invocation.
///
/// `rollback_dir` must already exist; the archive is written to
/// `rollback_dir/rollback.tar.gz`.
pub async fn capture_filesystem(cwd: &str, rm_tokens: &[&str], rollback_dir: &Path, max_size_mb: u64) -> Result<RollbackData, EngineError> {
    let patterns: Vec<&str> = rm_tokens.iter().filter(|t| !t.starts_with('-')).copied().collect();

    let mut roots = Vec::new();
    let mut resolved_paths = Vec::new();
    for (idx, pattern) in patterns.iter().enumerate() {
        let resolved = resolve_against(cwd, pattern);
        let expanded = expand_glob(&resolved);
        if expanded.is_empty() {
            continue;
        }
        let id = format!("p{idx}");
        roots.push(RollbackRoot { id: id.clone(), path: resolved.to_string_lossy().into_owned() });
        resolved_paths.push((id, expanded));
    }

    if roots.is_empty() {
        return Err(EngineError::RollbackTargetsMissing);
    }

    let total_bytes: u64 = resolved_paths
        .iter()
        .flat_map(|(_, paths)| paths.iter())
        .map(|p| estimate_size(p))
        .sum();
    if total_bytes > max_size_mb * 1024 * 1024 {
        return Err(EngineError::RollbackSizeExceeded);
    }

    let archive_path = rollback_dir.join("rollback.tar.gz");
    write_archive(&archive_path, &resolved_paths).map_err(|e| EngineError::Other(e.to_string()))?;

    Ok(RollbackData::Filesystem(FilesystemRollback { roots, archive_file: "rollback.tar.gz".to_string() }))
}

fn resolve_against(cwd: &str, target: &str) -> PathBuf {
    let p = Path::new(target);
    if p.is_absolute() { p.to_path_buf() } else { Path::new(cwd).join(p) }
}

/// Expand a glob pattern; a target with no metacharacters that exists on
/// disk is returned as-is, a nonexistent one is dropped (the "missing list"
/// of §4.7 step 1).
fn expand_glob(pattern: &Path) -> Vec<PathBuf> {
    let pattern_str = pattern.to_string_lossy();
    if !pattern_str.contains(['*', '?', '[']) {
        return if pattern.exists() { vec![pattern.to_path_buf()] } else { Vec::new() };
    }
    glob::glob(&pattern_str).map(|paths| paths.filter_map(Result::ok).collect()).unwrap_or_default()
}

fn estimate_size(path: &Path) -> u64 {
    if path.is_dir() {
        walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    } else {
        std::fs::symlink_metadata(path).map(|m| m.len()).unwrap_or(0)
    }
}

fn write_archive(archive_path: &Path, roots: &[(String, Vec<PathBuf>)]) -> std::io::Result<()> {
    let file = std::fs::File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = TarBuilder::new(encoder);

    for (prefix, paths) in roots {
        for path in paths {
            append_path(&mut builder, prefix, path)?;
        }
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

/// Archive `path` directly under `prefix` (not `prefix/<basename>`), so the
/// root's own resolved path — not its parent — is what `restore_filesystem`
/// reconstructs from `prefix` plus the remaining entry components.
fn append_path<W: std::io::Write>(builder: &mut TarBuilder<W>, prefix: &str, path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;

    if meta.file_type().is_symlink() {
        let link_target = std::fs::read_link(path)?;
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, Path::new(prefix), link_target.as_path())?;
        return Ok(());
    }

    if meta.is_dir() {
        builder.append_dir_all(prefix, path)?;
    } else {
        let mut file = std::fs::File::open(path)?;
        builder.append_file(prefix, &mut file)?;
    }
    Ok(())
}

/// Capture the repo root, HEAD, branch, and an uncommitted-diff patch.
pub async fn capture_git(cwd: &str, rollback_dir: &Path) -> Result<RollbackData, EngineError> {
    let repo_root = run_git(cwd, &["rev-parse", "--show-toplevel"]).await?.trim().to_string();
    let head = run_git(cwd, &["rev-parse", "HEAD"]).await?.trim().to_string();
    let branch_raw = run_git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).await?.trim().to_string();
    let branch = (branch_raw != "HEAD").then_some(branch_raw);

    let diff = run_git(cwd, &["diff", "HEAD"]).await.unwrap_or_default();
    let diff_file = if diff.trim().is_empty() {
        None
    } else {
        let path = rollback_dir.join("diff.patch");
        std::fs::write(&path, &diff).map_err(|e| EngineError::Other(e.to_string()))?;
        Some("diff.patch".to_string())
    };

    Ok(RollbackData::Git(GitRollback { repo_root, head, branch, diff_file }))
}

async fn run_git(cwd: &str, args: &[&str]) -> Result<String, EngineError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(cwd)
        .args(args)
        .output()
        .await
        .map_err(|e| EngineError::Other(format!("git {args:?} failed to spawn: {e}")))?;
    if !output.status.success() {
        return Err(EngineError::Other(format!("git {args:?} exited with {}", output.status)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Capture YAML for each resource targeted by a `kubectl delete` invocation.
pub async fn capture_kubernetes(delete_tokens: &[&str], rollback_dir: &Path) -> Result<RollbackData, EngineError> {
    let (namespace, resources) = parse_kubectl_delete(delete_tokens);
    let manifests_dir = rollback_dir.join("manifests");
    std::fs::create_dir_all(&manifests_dir).map_err(|e| EngineError::Other(e.to_string()))?;

    let mut manifests = Vec::new();
    for (kind, name) in resources {
        let mut args = vec!["get", kind.as_str(), name.as_str(), "-o", "yaml"];
        if let Some(ns) = &namespace {
            args.push("-n");
            args.push(ns);
        }
        let output = Command::new("kubectl").args(&args).output().await.map_err(|e| EngineError::Other(e.to_string()))?;
        if !output.status.success() {
            warn!(kind, name, "kubectl get failed during rollback capture; skipping this resource");
            continue;
        }
        let file_name = format!("{}.yaml", sanitize_filename(&format!("{kind}-{name}")));
        std::fs::write(manifests_dir.join(&file_name), &output.stdout).map_err(|e| EngineError::Other(e.to_string()))?;
        manifests.push(KubernetesManifest { kind, name, file: file_name });
    }

    Ok(RollbackData::Kubernetes(KubernetesRollback { namespace: namespace.unwrap_or_else(|| "default".to_string()), manifests }))
}

/// Parse `kubectl delete` arguments: namespace from `-n|--namespace[=value]`,
/// resources as `kind/name` pairs or `kind` followed by names, stopping at
/// the first flag or `--` (§4.7).
fn parse_kubectl_delete(tokens: &[&str]) -> (Option<String>, Vec<(String, String)>) {
    let mut namespace = None;
    let mut resources = Vec::new();
    let mut pending_kind: Option<String> = None;

    let mut iter = tokens.iter().skip(2).peekable(); // skip "kubectl", "delete"
    while let Some(&tok) = iter.next() {
        if tok == "--" {
            break;
        }
        if let Some(rest) = tok.strip_prefix("--namespace=") {
            namespace = Some(rest.to_string());
            continue;
        }
        if tok == "-n" || tok == "--namespace" {
            if let Some(&val) = iter.peek() {
                namespace = Some((*val).to_string());
                iter.next();
            }
            continue;
        }
        if tok.starts_with('-') {
            break;
        }
        if let Some((kind, name)) = tok.split_once('/') {
            resources.push((kind.to_string(), name.to_string()));
            continue;
        }
        match pending_kind.take() {
            Some(kind) => resources.push((kind, tok.to_string())),
            None => pending_kind = Some(tok.to_string()),
        }
    }

    (namespace, resources)
}
