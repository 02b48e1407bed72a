//! Static file mount points.
//!
//! # Responsibilities
//! - Map a URL prefix onto a directory
//! - Refuse paths that would escape the directory
//! - Serve files through a sized content provider so large files stream
//!
//! # Design Decisions
//! - Mounts are checked in registration order before any route
//! - A path ending in `/` serves `index.html`
//! - MIME type comes from user mappings first, then the built-in table

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use crate::http::response::Response;
use crate::http::types::mime;

const READ_BLOCK: usize = 64 * 1024;

/// One URL prefix served from a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub prefix: String,
    pub dir: PathBuf,
}

impl MountPoint {
    pub fn new(prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        Self { prefix, dir: dir.into() }
    }

    /// File under this mount that `path` names, if it stays inside the mount.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rest = path.strip_prefix(&self.prefix)?;
        // "/static" must not match "/staticfoo"
        if !(self.prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        let relative = Path::new(rest.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        let mut full = self.dir.join(relative);
        if rest.is_empty() || rest.ends_with('/') {
            full.push("index.html");
        }
        Some(full)
    }
}

/// Find the first mount that serves `path` with an existing regular file.
pub fn lookup(mounts: &[MountPoint], path: &str) -> Option<PathBuf> {
    mounts
        .iter()
        .filter_map(|m| m.resolve(path))
        .find(|p| p.is_file())
}

/// MIME type for `path`, preferring user-supplied extension mappings.
pub fn content_type_for(path: &Path, overrides: &HashMap<String, String>) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    overrides
        .get(&ext)
        .cloned()
        .or_else(|| mime::from_extension(&ext).map(str::to_string))
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

/// Attach `path` to `res` as a streamed body.
pub fn serve(path: &Path, res: &mut Response, overrides: &HashMap<String, String>) -> io::Result<()> {
    let mut file = File::open(path)?;
    let length = file.metadata()?.len();
    let content_type = content_type_for(path, overrides);
    let shown = path.display().to_string();

    let mut block = vec![0u8; READ_BLOCK];
    res.set_content_provider(length, &content_type, move |offset, remaining, sink| {
        let want = (remaining as usize).min(block.len());
        let read = file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| file.read(&mut block[..want]));
        match read {
            Ok(0) => false,
            Ok(n) => sink.write(&block[..n]),
            Err(e) => {
                tracing::warn!(error = %e, "Static file read failed");
                false
            }
        }
    });
    res.set_resource_releaser(move || {
        tracing::trace!(file = %shown, "Static file released");
    });
    Ok(())
}
