use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Staging directory for the build context, relative to the project root.
pub const CONTEXT_DIR: &str = ".atcache-context";

/// Patterns file honoured while staging. Only the one at the project root is read.
pub const IGNORE_FILE: &str = ".dockerignore";

/// Root entries never copied into the context, regardless of `.dockerignore`.
const ALWAYS_EXCLUDED: &[&str] = &[CONTEXT_DIR, ".git"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    /// Recreated as a link; the target is not followed.
    Symlink,
}

/// One path staged into the context, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Stages the project tree for `docker build`.
///
/// Directories, files and symlinks under `project_dir` are reproduced in
/// `.atcache-context/`, except root `.dockerignore` matches and the
/// always-excluded entries. The generated Dockerfile is written into the
/// context root.
pub fn create_context(
    project_dir: &Path,
    dockerfile_content: &str,
) -> Result<PathBuf, ContextError> {
    let context_dir = project_dir.join(CONTEXT_DIR);

    // Clean previous context
    if context_dir.exists() {
        std::fs::remove_dir_all(&context_dir).map_err(|e| ContextError::Cleanup {
            path: context_dir.clone(),
            source: e,
        })?;
    }
    create_dir(&context_dir)?;

    let entries = project_entries(project_dir)?;
    tracing::debug!(count = entries.len(), "staging build context");

    for entry in &entries {
        let src = project_dir.join(&entry.path);
        let dst = context_dir.join(&entry.path);

        if entry.kind == EntryKind::Dir {
            create_dir(&dst)?;
            continue;
        }
        if let Some(parent) = dst.parent() {
            create_dir(parent)?;
        }
        match entry.kind {
            EntryKind::File => {
                std::fs::copy(&src, &dst).map_err(|e| ContextError::CopyFile {
                    path: src,
                    source: e,
                })?;
            }
            EntryKind::Symlink => copy_symlink(&src, &dst)?,
            EntryKind::Dir => {}
        }
    }

    let dockerfile_path = context_dir.join("Dockerfile");
    std::fs::write(&dockerfile_path, dockerfile_content).map_err(|e| {
        ContextError::WriteDockerfile {
            path: dockerfile_path.clone(),
            source: e,
        }
    })?;

    Ok(context_dir)
}

/// Removes the staging directory if present.
pub fn remove_context(project_dir: &Path) -> Result<(), ContextError> {
    let context_dir = project_dir.join(CONTEXT_DIR);
    if context_dir.exists() {
        std::fs::remove_dir_all(&context_dir).map_err(|e| ContextError::Cleanup {
            path: context_dir,
            source: e,
        })?;
    }
    Ok(())
}

/// Files and symlinks that would be staged, relative to `project_dir`, in walk order.
pub fn project_files(project_dir: &Path) -> Result<Vec<PathBuf>, ContextError> {
    Ok(project_entries(project_dir)?
        .into_iter()
        .filter(|entry| entry.kind != EntryKind::Dir)
        .map(|entry| entry.path)
        .collect())
}

/// Every entry that would be staged, relative to `project_dir`, in walk order.
pub fn project_entries(project_dir: &Path) -> Result<Vec<ContextEntry>, ContextError> {
    let ignore = Arc::new(load_dockerignore(project_dir)?);

    let prune = Arc::clone(&ignore);
    let walker = WalkBuilder::new(project_dir)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            if entry.depth() == 1
                && ALWAYS_EXCLUDED
                    .iter()
                    .any(|excluded| entry.file_name() == *excluded)
            {
                return false;
            }
            // A `!` pattern may re-include something below an excluded directory.
            if prune.num_whitelists() > 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !prune.matched(entry.path(), is_dir).is_ignore()
        })
        .build();

    let mut entries = Vec::new();
    for result in walker {
        let entry = result.map_err(|e| ContextError::Walk {
            root: project_dir.to_path_buf(),
            source: e,
        })?;
        if entry.depth() == 0 {
            continue;
        }
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping special file");
            continue;
        };

        let relative = entry
            .path()
            .strip_prefix(project_dir)
            .map_err(|_| ContextError::OutsideProject {
                path: entry.path().to_path_buf(),
            })?;
        if ignore
            .matched_path_or_any_parents(relative, kind == EntryKind::Dir)
            .is_ignore()
        {
            continue;
        }
        entries.push(ContextEntry {
            path: relative.to_path_buf(),
            kind,
        });
    }

    Ok(entries)
}

/// Builds a matcher from the root `.dockerignore`, anchoring every pattern
/// at the context root the way Docker does.
fn load_dockerignore(project_dir: &Path) -> Result<Gitignore, ContextError> {
    let path = project_dir.join(IGNORE_FILE);
    let mut builder = GitignoreBuilder::new(project_dir);

    if path.is_file() {
        let content = std::fs::read_to_string(&path).map_err(|e| ContextError::ReadIgnore {
            path: path.clone(),
            source: e,
        })?;
        for (idx, line) in content.lines().enumerate() {
            let Some(pattern) = anchor_pattern(line) else {
                continue;
            };
            builder
                .add_line(Some(path.clone()), &pattern)
                .map_err(|e| ContextError::InvalidPattern {
                    path: path.clone(),
                    line: idx + 1,
                    source: e,
                })?;
        }
    }

    builder
        .build()
        .map_err(|e| ContextError::IgnoreBuild { path, source: e })
}

/// `data` → `/data`, `!./keep/` → `!/keep`. Comments and blanks yield `None`.
fn anchor_pattern(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (negate, mut pattern) = match trimmed.strip_prefix('!') {
        Some(rest) => ("!", rest.trim()),
        None => ("", trimmed),
    };
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
    if pattern.is_empty() || pattern == "." {
        return None;
    }
    Some(format!("{negate}/{pattern}"))
}

fn create_dir(path: &Path) -> Result<(), ContextError> {
    std::fs::create_dir_all(path).map_err(|e| ContextError::Create {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), ContextError> {
    let target = std::fs::read_link(src).map_err(|e| ContextError::ReadLink {
        path: src.to_path_buf(),
        source: e,
    })?;
    std::os::unix::fs::symlink(&target, dst).map_err(|e| ContextError::CopyFile {
        path: src.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), ContextError> {
    std::fs::copy(src, dst).map_err(|e| ContextError::CopyFile {
        path: src.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to clean up build context {path}")]
    Cleanup {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    Create {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy file {path}")]
    CopyFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write Dockerfile at {path}")]
    WriteDockerfile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to walk project tree at {root}")]
    Walk {
        root: std::path::PathBuf,
        source: ignore::Error,
    },
    #[error("walked outside the project tree: {path}")]
    OutsideProject { path: std::path::PathBuf },
    #[error("failed to read {path}")]
    ReadIgnore {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("invalid pattern at {path}:{line}")]
    InvalidPattern {
        path: std::path::PathBuf,
        line: usize,
        source: ignore::Error,
    },
    #[error("failed to build ignore rules from {path}")]
    IgnoreBuild {
        path: std::path::PathBuf,
        source: ignore::Error,
    },
    #[error("failed to read symlink {path}")]
    ReadLink {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
