//! Core data models used throughout docchat.
//!
//! These types describe where documents come from ([`SourceDescriptor`]),
//! how the language model is configured ([`ModelConfig`]), and the documents,
//! chunks, and chat messages that flow from the staging directory to the
//! chat engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four supported document sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Archive,
    ObjectStorage,
    RemoteFileServer,
    VersionControl,
}

impl SourceKind {
    /// Short label used in notices and on the command line.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Archive => "zip",
            SourceKind::ObjectStorage => "s3",
            SourceKind::RemoteFileServer => "sftp",
            SourceKind::VersionControl => "git",
        }
    }

    /// Credential keys this kind requires.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Archive => &[],
            SourceKind::ObjectStorage => &["bucket_name", "key_id", "key_secret"],
            SourceKind::RemoteFileServer => &["hostname", "username", "password"],
            SourceKind::VersionControl => &["repo_url", "access_token"],
        }
    }

    /// Credential keys this kind accepts but does not require.
    pub fn optional_keys(&self) -> &'static [&'static str] {
        match self {
            SourceKind::VersionControl => &["branch"],
            _ => &[],
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fully validated request describing one ingestion run.
///
/// Each variant carries exactly the fields its source needs, so a
/// descriptor with the wrong credential set cannot be constructed. Use
/// [`crate::selector::build_descriptor`] to build one from loose user input.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub enum SourceDescriptor {
    Archive {
        #[serde(serialize_with = "serialize_digest")]
        bytes: Vec<u8>,
    },
    ObjectStorage {
        bucket: String,
        key_id: String,
        key_secret: String,
        prefix: String,
    },
    RemoteFileServer {
        hostname: String,
        username: String,
        password: String,
        path: String,
    },
    VersionControl {
        repo_url: String,
        access_token: String,
        branch: Option<String>,
        path: String,
    },
}

impl SourceDescriptor {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Archive { .. } => SourceKind::Archive,
            SourceDescriptor::ObjectStorage { .. } => SourceKind::ObjectStorage,
            SourceDescriptor::RemoteFileServer { .. } => SourceKind::RemoteFileServer,
            SourceDescriptor::VersionControl { .. } => SourceKind::VersionControl,
        }
    }
}

// Secrets and archive payloads stay out of debug output.
impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Archive { bytes } => f
                .debug_struct("Archive")
                .field("bytes", &format_args!("<{} bytes>", bytes.len()))
                .finish(),
            SourceDescriptor::ObjectStorage {
                bucket,
                key_id,
                prefix,
                ..
            } => f
                .debug_struct("ObjectStorage")
                .field("bucket", bucket)
                .field("key_id", key_id)
                .field("key_secret", &"***")
                .field("prefix", prefix)
                .finish(),
            SourceDescriptor::RemoteFileServer {
                hostname,
                username,
                path,
                ..
            } => f
                .debug_struct("RemoteFileServer")
                .field("hostname", hostname)
                .field("username", username)
                .field("password", &"***")
                .field("path", path)
                .finish(),
            SourceDescriptor::VersionControl {
                repo_url,
                branch,
                path,
                ..
            } => f
                .debug_struct("VersionControl")
                .field("repo_url", repo_url)
                .field("access_token", &"***")
                .field("branch", branch)
                .field("path", path)
                .finish(),
        }
    }
}

/// Archive payloads are represented by their SHA-256 digest when hashed
/// into a cache key.
#[allow(clippy::ptr_arg)]
fn serialize_digest<S: serde::Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
    use sha2::{Digest, Sha256};
    s.serialize_str(&hex::encode(Sha256::digest(bytes)))
}

/// Model tier offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTier {
    /// `gpt-3.5-turbo`
    FastTier,
    /// `gpt-4`
    #[default]
    CapableTier,
}

impl ModelTier {
    pub fn model_name(&self) -> &'static str {
        match self {
            ModelTier::FastTier => "gpt-3.5-turbo",
            ModelTier::CapableTier => "gpt-4",
        }
    }
}

/// Configuration handed to the index builder and chat engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub model: ModelTier,
    /// Sampling temperature in `[0.0, 1.0]`.
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: ModelTier::default(),
            temperature: 0.0,
            system_prompt: String::new(),
        }
    }
}

/// A document read from the staging directory.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the staging directory, `/`-separated.
    pub path: String,
    /// File name.
    pub title: String,
    pub text: String,
}

/// A chunk of a document's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Speaker of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_secrets() {
        let d = SourceDescriptor::RemoteFileServer {
            hostname: "h".into(),
            username: "u".into(),
            password: "hunter2".into(),
            path: "/docs".into(),
        };
        let out = format!("{:?}", d);
        assert!(!out.contains("hunter2"));
        assert!(out.contains("/docs"));
    }

    #[test]
    fn archive_serializes_as_digest() {
        let d = SourceDescriptor::Archive {
            bytes: vec![1, 2, 3],
        };
        let json = serde_json::to_string(&d).unwrap();
        assert!(!json.contains("[1,2,3]"));
        assert_eq!(d.kind(), SourceKind::Archive);
    }

    #[test]
    fn tier_names() {
        assert_eq!(ModelTier::FastTier.model_name(), "gpt-3.5-turbo");
        assert_eq!(ModelTier::default().model_name(), "gpt-4");
    }
}
