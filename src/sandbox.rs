/*
 * Tinker - Sandboxed Tool-Calling Agent
 * File Path: src/sandbox.rs
 * Responsibility: Working root ownership and path containment for every tool.
 */

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Matches the kernel's own limit on chained links during one lookup.
const MAX_SYMLINK_HOPS: usize = 40;

/// A requested path that resolves outside the working root.
///
/// Carries the path exactly as the caller typed it, never the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("path \"{requested}\" is outside the permitted working directory")]
pub struct ContainmentError {
    pub requested: String,
}

/// Why a requested path could not be turned into a location under the root.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Outside(#[from] ContainmentError),
    /// The path stays lexically inside, but its symlinks cannot be followed.
    #[error("cannot resolve \"{requested}\": {source}")]
    Unresolvable { requested: String, source: io::Error },
}

/// The single directory all sandboxed operations are confined to.
///
/// Cheap to clone; the canonical path is shared.
#[derive(Debug, Clone)]
pub struct WorkingRoot {
    root: Arc<PathBuf>,
}

impl WorkingRoot {
    /// Canonicalizes `path` once. Fails if it is missing or not a directory.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let root = fs::canonicalize(path.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root: Arc::new(root) })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative` against the root.
    ///
    /// Absolute paths and `..` segments that climb above the root are rejected
    /// before touching the filesystem. Whatever survives is walked one
    /// component at a time: symlinks are followed (dangling ones included) and
    /// `..` applies to the directory a link actually led to. Components that do
    /// not exist, or cannot be inspected, are kept as written so the caller's
    /// own existence checks report them. The result must sit at or below the
    /// root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, ResolveError> {
        let escape = || ContainmentError {
            requested: relative.to_string(),
        };

        if climbs_out_lexically(Path::new(relative)) {
            return Err(escape().into());
        }

        let physical =
            walk(&self.root, Path::new(relative)).map_err(|source| ResolveError::Unresolvable {
                requested: relative.to_string(),
                source,
            })?;

        // Component-wise prefix: `/work2` is not inside `/work`.
        if physical.starts_with(self.root.as_path()) {
            Ok(physical)
        } else {
            Err(escape().into())
        }
    }
}

/// True for absolute paths and for `..` chains that leave their starting
/// point when folded textually.
fn climbs_out_lexically(relative: &Path) -> bool {
    let mut depth = 0usize;
    for component in relative.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return true,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(up) => depth = up,
                None => return true,
            },
            Component::Normal(_) => depth += 1,
        }
    }
    false
}

enum Part {
    Prefix(OsString),
    RootDir,
    Parent,
    Name(OsString),
}

fn parts_of(path: &Path) -> Vec<Part> {
    path.components()
        .filter_map(|component| match component {
            Component::Prefix(prefix) => Some(Part::Prefix(prefix.as_os_str().to_os_string())),
            Component::RootDir => Some(Part::RootDir),
            Component::CurDir => None,
            Component::ParentDir => Some(Part::Parent),
            Component::Normal(name) => Some(Part::Name(name.to_os_string())),
        })
        .collect()
}

/// Applies `relative` to `start` the way the kernel would, but tolerating
/// missing components. `start` must already be canonical; every existing
/// component appended afterwards is a real directory entry, so popping on
/// `..` is always physically correct.
fn walk(start: &Path, relative: &Path) -> io::Result<PathBuf> {
    let mut current = start.to_path_buf();
    let mut pending: VecDeque<Part> = parts_of(relative).into();
    let mut hops = 0;

    while let Some(part) = pending.pop_front() {
        match part {
            Part::Prefix(prefix) => current = PathBuf::from(prefix),
            Part::RootDir => current.push(Component::RootDir),
            Part::Parent => {
                current.pop();
            }
            Part::Name(name) => {
                let candidate = current.join(&name);
                let is_link = fs::symlink_metadata(&candidate)
                    .map(|meta| meta.file_type().is_symlink())
                    .unwrap_or(false);
                if !is_link {
                    current = candidate;
                    continue;
                }

                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(io::Error::other("too many levels of symbolic links"));
                }
                // Relative targets are read against the link's own directory,
                // which is `current`; absolute ones reset it.
                let target = fs::read_link(&candidate)?;
                for part in parts_of(&target).into_iter().rev() {
                    pending.push_front(part);
                }
            }
        }
    }
    Ok(current)
}
