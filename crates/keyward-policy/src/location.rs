//! Where files live relative to source code.
//!
//! The storage rules ask a [`StorageProbe`] about repository roots, ignore
//! status and package roots. [`SystemProbe`] answers by running `git` and
//! walking the filesystem for package manifests; tests plug in fakes.
//!
//! [`SystemProbe`] reads relative paths against its working directory.
//!
//! A file counts as *stored with code* when, after resolving symlinks:
//!
//! 1. its directory is inside a repository, the file is not ignored there,
//!    and that repository is the working directory's repository; or
//! 2. it is in no repository, but inside a package whose root is the
//!    working directory's package root.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{PolicyError, Result};

/// Default limit for a single `git` invocation.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Manifests that mark a package root, checked in order.
pub const DEFAULT_PACKAGE_MANIFESTS: &[&str] = &["Cargo.toml", "package.json"];

const MAX_SYMLINK_HOPS: usize = 40;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StorageProbe: Send + Sync {
    /// Follow symlinks until a non-link path is reached. Returns the input
    /// unchanged when it cannot be read.
    async fn resolve_symlink(&self, path: &Path) -> PathBuf;

    /// Root of the repository containing `dir`, if any.
    async fn repo_root(&self, dir: &Path) -> Result<Option<PathBuf>>;

    /// Whether the repository containing `path` ignores it.
    async fn is_ignored_by_repo(&self, path: &Path) -> Result<bool>;

    /// Nearest ancestor of `dir` (inclusive) holding a package manifest.
    async fn package_root(&self, dir: &Path) -> Result<Option<PathBuf>>;

    /// The directory the source code is considered to live in.
    fn working_dir(&self) -> Result<PathBuf>;

    /// Whether `path` is inside a repository and not ignored by it.
    async fn is_tracked_by_repo(&self, path: &Path) -> Result<bool> {
        match self.repo_root(parent_dir(path)).await? {
            Some(_) => Ok(!self.is_ignored_by_repo(path).await?),
            None => Ok(false),
        }
    }

    /// Whether `path` is stored alongside the working directory's code.
    async fn stored_with_code(&self, path: &Path) -> Result<bool> {
        let path = self.resolve_symlink(path).await;
        let cwd = self.working_dir()?;

        if let Some(root) = self.repo_root(parent_dir(&path)).await? {
            if self.is_ignored_by_repo(&path).await? {
                return Ok(false);
            }
            let code_root = self.repo_root(&cwd).await?;
            return Ok(code_root.as_deref() == Some(root.as_path()));
        }

        if let Some(root) = self.package_root(parent_dir(&path)).await? {
            let code_root = self.package_root(&cwd).await?;
            return Ok(code_root.as_deref() == Some(root.as_path()));
        }

        Ok(false)
    }
}

/// Directory containing `path`; `path` itself when it has no parent.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => path,
    }
}

// ---------------------------------------------------------------------------
// System probe
// ---------------------------------------------------------------------------

/// [`StorageProbe`] backed by the `git` CLI and the local filesystem.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    timeout: Duration,
    manifests: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

struct GitOutput {
    code: Option<i32>,
    stdout: String,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            manifests: DEFAULT_PACKAGE_MANIFESTS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            working_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the package manifest file names.
    pub fn with_manifests<I, S>(mut self, manifests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifests = manifests.into_iter().map(Into::into).collect();
        self
    }

    /// Pin the working directory instead of using the process's.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// `path` joined onto the working directory when relative.
    fn absolutize(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let joined = self.working_dir()?.join(path);
        std::path::absolute(&joined).map_err(|e| PolicyError::Probe {
            reason: format!("cannot make {} absolute: {e}", joined.display()),
        })
    }

    /// Run `git -C <dir> <args>`. `Ok(None)` when git is not installed.
    async fn run_git(&self, dir: &Path, args: &[&OsStr]) -> Result<Option<GitOutput>> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(dir).args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(PolicyError::Probe {
                    reason: format!("git timed out after {:?} in {}", self.timeout, dir.display()),
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("git not installed, assuming no repository");
                return Ok(None);
            }
            Ok(Err(e)) => {
                return Err(PolicyError::Probe {
                    reason: format!("failed to run git in {}: {e}", dir.display()),
                });
            }
            Ok(Ok(output)) => output,
        };

        tracing::trace!(
            dir = %dir.display(),
            code = ?output.status.code(),
            "git invocation finished"
        );

        Ok(Some(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        }))
    }
}

#[async_trait]
impl StorageProbe for SystemProbe {
    async fn resolve_symlink(&self, path: &Path) -> PathBuf {
        let mut current = match self.absolutize(path) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot resolve symlink");
                return path.to_path_buf();
            }
        };
        for _ in 0..MAX_SYMLINK_HOPS {
            match tokio::fs::read_link(&current).await {
                Ok(target) if target.is_absolute() => current = target,
                Ok(target) => current = parent_dir(&current).join(target),
                Err(_) => return current,
            }
        }
        tracing::warn!(path = %path.display(), "symlink chain too long, using last hop");
        current
    }

    async fn repo_root(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let dir = self.absolutize(dir)?;
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(None);
        }
        let args = [OsStr::new("rev-parse"), OsStr::new("--show-toplevel")];
        let root = match self.run_git(&dir, &args).await? {
            Some(out) if out.code == Some(0) && !out.stdout.is_empty() => {
                Some(PathBuf::from(out.stdout))
            }
            _ => None,
        };
        tracing::debug!(dir = %dir.display(), root = ?root, "repository root lookup");
        Ok(root)
    }

    async fn is_ignored_by_repo(&self, path: &Path) -> Result<bool> {
        let path = self.absolutize(path)?;
        // git reads the pathspec relative to `-C`, so pass only the file name.
        let name = path.file_name().unwrap_or(path.as_os_str());
        let args = [
            OsStr::new("check-ignore"),
            OsStr::new("-q"),
            OsStr::new("--"),
            name,
        ];
        match self.run_git(parent_dir(&path), &args).await? {
            None => Ok(false),
            Some(out) => match out.code {
                Some(0) => Ok(true),
                Some(1) => Ok(false),
                code => Err(PolicyError::Probe {
                    reason: format!(
                        "git check-ignore failed for {} (exit code {code:?})",
                        path.display()
                    ),
                }),
            },
        }
    }

    async fn package_root(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let dir = self.absolutize(dir)?;
        for ancestor in dir.ancestors() {
            for manifest in &self.manifests {
                if tokio::fs::try_exists(ancestor.join(manifest))
                    .await
                    .unwrap_or(false)
                {
                    return Ok(Some(ancestor.to_path_buf()));
                }
            }
        }
        Ok(None)
    }

    fn working_dir(&self) -> Result<PathBuf> {
        match &self.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(|e| PolicyError::Probe {
                reason: format!("cannot determine working directory: {e}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
