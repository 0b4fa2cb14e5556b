//! Source selection and credential collection.
//!
//! Turns loose user input (a source kind, a key/value credential map, an
//! optional path, and optional archive bytes) into a validated
//! [`SourceDescriptor`]. No network I/O happens here.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::FetchError;
use crate::models::{SourceDescriptor, SourceKind};

/// Credential values that may legitimately be empty (public repositories,
/// default branch).
const MAY_BE_EMPTY: &[&str] = &["access_token", "branch"];

/// Build a [`SourceDescriptor`] for `kind`.
///
/// The keys in `credentials` must be exactly the kind's required keys plus
/// any of its optional keys. Every kind except `Archive` needs a `path`
/// (which may be empty to mean the root); `Archive` needs non-empty
/// `archive` bytes and no path.
pub fn build_descriptor(
    kind: SourceKind,
    credentials: &BTreeMap<String, String>,
    path: Option<&str>,
    archive: Option<Vec<u8>>,
) -> Result<SourceDescriptor, FetchError> {
    check_keys(kind, credentials)?;

    let get = |key: &str| -> String {
        credentials
            .get(key)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    if kind == SourceKind::Archive {
        if path.is_some() {
            return Err(FetchError::Credentials(
                "zip sources take no directory path".to_string(),
            ));
        }
        return match archive {
            Some(bytes) if !bytes.is_empty() => Ok(SourceDescriptor::Archive { bytes }),
            _ => Err(FetchError::Credentials(
                "no zip file was provided".to_string(),
            )),
        };
    }

    if archive.is_some() {
        return Err(FetchError::Credentials(format!(
            "{} sources do not accept archive bytes",
            kind
        )));
    }
    let path = path
        .ok_or_else(|| FetchError::Credentials(format!("{} sources need a directory path", kind)))?
        .trim()
        .to_string();

    Ok(match kind {
        SourceKind::ObjectStorage => SourceDescriptor::ObjectStorage {
            bucket: get("bucket_name"),
            key_id: get("key_id"),
            key_secret: get("key_secret"),
            prefix: path,
        },
        SourceKind::RemoteFileServer => SourceDescriptor::RemoteFileServer {
            hostname: get("hostname"),
            username: get("username"),
            password: credentials.get("password").cloned().unwrap_or_default(),
            path,
        },
        SourceKind::VersionControl => {
            let branch = get("branch");
            SourceDescriptor::VersionControl {
                repo_url: get("repo_url"),
                access_token: get("access_token"),
                branch: (!branch.is_empty()).then_some(branch),
                path,
            }
        }
        SourceKind::Archive => unreachable!("handled above"),
    })
}

fn check_keys(kind: SourceKind, credentials: &BTreeMap<String, String>) -> Result<(), FetchError> {
    let required = kind.required_keys();
    let optional = kind.optional_keys();

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| !credentials.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(FetchError::Credentials(format!(
            "{} source is missing: {}",
            kind,
            missing.join(", ")
        )));
    }

    let unexpected: Vec<&str> = credentials
        .keys()
        .map(String::as_str)
        .filter(|k| !required.contains(k) && !optional.contains(k))
        .collect();
    if !unexpected.is_empty() {
        return Err(FetchError::Credentials(format!(
            "{} source does not take: {}",
            kind,
            unexpected.join(", ")
        )));
    }

    let empty: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| !MAY_BE_EMPTY.contains(k))
        .filter(|k| credentials.get(*k).is_some_and(|v| v.trim().is_empty()))
        .collect();
    if !empty.is_empty() {
        return Err(FetchError::Credentials(format!(
            "{} source has empty values for: {}",
            kind,
            empty.join(", ")
        )));
    }

    Ok(())
}

/// Read a zip file from disk for an `Archive` descriptor.
pub fn read_archive(path: &Path) -> Result<Vec<u8>, FetchError> {
    std::fs::read(path).map_err(|e| {
        FetchError::Credentials(format!("cannot read zip file {}: {}", path.display(), e))
    })
}
