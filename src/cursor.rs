//! Cursor feedback while a grab is waiting for its click.
//!
//! [`CursorPatch`] replaces every standard system pointer shape with one
//! "targeting" shape so the user can see that the next click selects a
//! window, and puts the originals back afterwards.
//!
//! Two restore strategies are available ([`RestoreMode`]):
//!
//! * `snapshot` (default): each original shape is duplicated before it is
//!   replaced, and the exact duplicate is put back.  Survives per-user
//!   cursor customisation and cursors changed at runtime by other tools.
//! * `reload`: the user's cursor scheme is reloaded from its stored
//!   settings.  Cheaper, but shapes set at runtime by other programs are
//!   lost.
//!
//! Whichever mode is used, the set is never left half patched: a failure
//! part way through puts back every shape already replaced.

use crate::traits::Platform;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// The targeting cursor shipped with wingrab.
const BUNDLED_CURSOR: &[u8] = include_bytes!("../assets/target.cur");

/// File name the bundled cursor is written to inside the temp directory.
const BUNDLED_CURSOR_FILE_NAME: &str = "wingrab-target.cur";

/// One of the standard system cursor shapes (`OCR_*` ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorId {
    Arrow,
    IBeam,
    Wait,
    Cross,
    UpArrow,
    SizeNwse,
    SizeNesw,
    SizeWe,
    SizeNs,
    SizeAll,
    No,
    Hand,
    AppStarting,
}

impl CursorId {
    /// Every standard shape, in patch order.
    pub const ALL: [CursorId; 13] = [
        CursorId::Arrow,
        CursorId::IBeam,
        CursorId::Wait,
        CursorId::Cross,
        CursorId::UpArrow,
        CursorId::SizeNwse,
        CursorId::SizeNesw,
        CursorId::SizeWe,
        CursorId::SizeNs,
        CursorId::SizeAll,
        CursorId::No,
        CursorId::Hand,
        CursorId::AppStarting,
    ];

    /// The numeric system id.
    pub fn raw(self) -> u32 {
        match self {
            CursorId::Arrow => 32512,
            CursorId::IBeam => 32513,
            CursorId::Wait => 32514,
            CursorId::Cross => 32515,
            CursorId::UpArrow => 32516,
            CursorId::SizeNwse => 32642,
            CursorId::SizeNesw => 32643,
            CursorId::SizeWe => 32644,
            CursorId::SizeNs => 32645,
            CursorId::SizeAll => 32646,
            CursorId::No => 32648,
            CursorId::Hand => 32649,
            CursorId::AppStarting => 32650,
        }
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.raw())
    }
}

/// How patched cursors are put back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Reload the user's cursor scheme.
    Reload,
    /// Put back exact duplicates taken before patching.
    #[default]
    Snapshot,
}

/// Errors from the cursor controller.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// The cursor asset exists but may not be read.
    #[error("cannot read cursor file {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The replacement shape could not be loaded.
    #[error("failed to load cursor {}{}: {message}", .path.display(), for_id(.id))]
    Load {
        id: Option<CursorId>,
        path: PathBuf,
        message: String,
    },

    /// A cursor call into the platform failed.
    #[error("{op} failed: {message}")]
    Platform { op: &'static str, message: String },

    #[error("cursor file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn for_id(id: &Option<CursorId>) -> String {
    match id {
        Some(id) => format!(" for {}", id),
        None => String::new(),
    }
}

/// Find the cursor file to patch with.
///
/// An explicit `path` must be readable.  Without one, the bundled
/// targeting cursor is written to the temp directory (once per content
/// change) and that copy is used.
pub fn resolve_asset(path: Option<&Path>) -> Result<PathBuf, CursorError> {
    match path {
        Some(path) => check_readable(path),
        None => write_bundled(&std::env::temp_dir()),
    }
}

fn check_readable(path: &Path) -> Result<PathBuf, CursorError> {
    match std::fs::File::open(path) {
        Ok(_) => Ok(path.to_path_buf()),
        Err(source) => Err(match source.kind() {
            io::ErrorKind::PermissionDenied => CursorError::PermissionDenied {
                path: path.to_path_buf(),
                source,
            },
            io::ErrorKind::NotFound => CursorError::Load {
                id: None,
                path: path.to_path_buf(),
                message: "file not found".into(),
            },
            _ => CursorError::Io {
                path: path.to_path_buf(),
                source,
            },
        }),
    }
}

fn write_bundled(dir: &Path) -> Result<PathBuf, CursorError> {
    let path = dir.join(BUNDLED_CURSOR_FILE_NAME);
    if std::fs::read(&path).is_ok_and(|existing| existing == BUNDLED_CURSOR) {
        return Ok(path);
    }
    std::fs::write(&path, BUNDLED_CURSOR).map_err(|source| {
        if source.kind() == io::ErrorKind::PermissionDenied {
            CursorError::PermissionDenied {
                path: path.clone(),
                source,
            }
        } else {
            CursorError::Io {
                path: path.clone(),
                source,
            }
        }
    })?;
    debug!("wrote bundled cursor to {}", path.display());
    Ok(path)
}

/// Replaces and restores the standard cursor set through a [`Platform`].
pub struct CursorPatch<'p, P: Platform> {
    platform: &'p P,
    mode: RestoreMode,
    /// Duplicates of the original shapes (snapshot mode only).
    originals: Vec<(CursorId, P::Cursor)>,
    /// Ids currently showing the targeting shape.
    patched: Vec<CursorId>,
}

impl<'p, P: Platform> CursorPatch<'p, P> {
    pub fn new(platform: &'p P, mode: RestoreMode) -> Self {
        Self {
            platform,
            mode,
            originals: Vec::new(),
            patched: Vec::new(),
        }
    }

    pub fn mode(&self) -> RestoreMode {
        self.mode
    }

    /// Whether any shape currently shows the targeting cursor.
    pub fn is_patched(&self) -> bool {
        !self.patched.is_empty()
    }

    /// Replace all [`CursorId::ALL`] shapes with the cursor at `asset`.
    ///
    /// Each id gets its own freshly loaded copy, since the system takes
    /// ownership of what it is given.  On any failure every shape patched
    /// so far is restored before the error is returned.  A no-op if already
    /// patched.
    pub fn patch_all(&mut self, asset: &Path) -> Result<(), CursorError> {
        if self.is_patched() {
            return Ok(());
        }

        if self.mode == RestoreMode::Snapshot {
            for id in CursorId::ALL {
                match self.platform.snapshot_cursor(id) {
                    Ok(original) => self.originals.push((id, original)),
                    Err(e) => {
                        self.originals.clear();
                        return Err(CursorError::Platform {
                            op: "snapshot cursor",
                            message: format!("{}: {}", id, e),
                        });
                    }
                }
            }
        }

        for id in CursorId::ALL {
            let cursor = match self.platform.load_cursor(asset) {
                Ok(cursor) => cursor,
                Err(e) => {
                    self.abort_patch();
                    return Err(CursorError::Load {
                        id: Some(id),
                        path: asset.to_path_buf(),
                        message: e.to_string(),
                    });
                }
            };
            if let Err(e) = self.platform.set_system_cursor(cursor, id) {
                self.abort_patch();
                return Err(CursorError::Platform {
                    op: "set system cursor",
                    message: format!("{}: {}", id, e),
                });
            }
            self.patched.push(id);
        }

        debug!("patched {} system cursors", self.patched.len());
        Ok(())
    }

    /// Put back every patched shape.
    ///
    /// A no-op when nothing is patched, so calling it twice is harmless.
    /// In snapshot mode a failed put-back falls back to a scheme reload
    /// before the error is reported.
    pub fn restore_all(&mut self) -> Result<(), CursorError> {
        if !self.is_patched() {
            // Unused duplicates from an aborted patch are freed here.
            self.originals.clear();
            return Ok(());
        }

        let result = match self.mode {
            RestoreMode::Reload => self.reload(),
            RestoreMode::Snapshot => self.restore_snapshots(),
        };
        self.patched.clear();
        self.originals.clear();
        if result.is_ok() {
            debug!("restored system cursors ({:?})", self.mode);
        }
        result
    }

    fn restore_snapshots(&mut self) -> Result<(), CursorError> {
        let mut failure = None;
        for (id, original) in self.originals.drain(..) {
            if !self.patched.contains(&id) {
                continue;
            }
            if let Err(e) = self.platform.set_system_cursor(original, id) {
                warn!("could not restore cursor {}: {}", id, e);
                failure.get_or_insert_with(|| format!("{}: {}", id, e));
            }
        }
        match failure {
            None => Ok(()),
            Some(message) => {
                self.reload()?;
                Err(CursorError::Platform {
                    op: "restore system cursor",
                    message,
                })
            }
        }
    }

    fn reload(&self) -> Result<(), CursorError> {
        self.platform
            .reload_system_cursors()
            .map_err(|e| CursorError::Platform {
                op: "reload system cursors",
                message: e.to_string(),
            })
    }

    /// Best-effort rollback used when patching fails half way.
    fn abort_patch(&mut self) {
        if let Err(e) = self.restore_all() {
            warn!("rollback of partially patched cursors failed: {}", e);
        }
    }
}

impl<P: Platform> Drop for CursorPatch<'_, P> {
    fn drop(&mut self) {
        if self.is_patched() {
            if let Err(e) = self.restore_all() {
                warn!("could not restore cursors on drop: {}", e);
            }
        }
    }
}

//  Tests
