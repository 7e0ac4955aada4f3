//! Artifact location helpers.
//!
//! Artifacts are addressed by `file:` URIs (optionally carrying the
//! `reference:` prefix used by hosts that deploy in place). These helpers turn
//! paths into locations and back, and answer "is the backing file still
//! there" for the pollers.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Prefix marking an in-place (referenced, not copied) artifact.
pub const REFERENCE_PREFIX: &str = "reference:";

const FILE_SCHEME: &str = "file:";

/// Bytes escaped in a location path: everything but `[A-Za-z0-9\-_.~/]`.
const PATH_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Build the `file:` URI used as the artifact location for `path`.
///
/// Relative paths are made absolute against the current directory.
pub fn path_to_uri(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut raw = absolute.to_string_lossy().replace('\\', "/");
    if !raw.starts_with('/') {
        raw.insert(0, '/');
    }
    format!("file://{}", utf8_percent_encode(&raw, PATH_ESCAPES))
}

/// Resolve a location back to a filesystem path.
///
/// Accepts `file:///abs/path`, `file:/abs/path` and `file://localhost/abs/path`,
/// with or without the `reference:` prefix. Anything else yields `None`.
pub fn uri_to_path(location: &str) -> Option<PathBuf> {
    let location = location.strip_prefix(REFERENCE_PREFIX).unwrap_or(location);
    let rest = location.strip_prefix(FILE_SCHEME)?;
    let path = if let Some(authority_and_path) = rest.strip_prefix("//") {
        let slash = authority_and_path.find('/')?;
        let (authority, path) = authority_and_path.split_at(slash);
        if !authority.is_empty() && authority != "localhost" {
            return None;
        }
        path
    } else {
        rest
    };
    if !path.starts_with('/') {
        return None;
    }
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    Some(PathBuf::from(decoded.as_ref()))
}

/// Returns the backing file when the location points to an existing,
/// readable regular file.
pub fn valid_file(location: &str) -> Option<PathBuf> {
    let path = uri_to_path(location)?;
    let metadata = std::fs::metadata(&path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    File::open(&path).ok()?;
    Some(path)
}

/// Filesystem modification time in milliseconds since the Unix epoch.
pub fn modified_millis(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let millis = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
    i64::try_from(millis).ok()
}

/// Turn a location into a flat, filesystem-safe file stem.
pub fn sanitize(location: &str) -> String {
    location
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
