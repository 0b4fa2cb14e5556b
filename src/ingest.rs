//! Ingestion adapter.
//!
//! Dispatches a [`SourceDescriptor`] to the matching connector and
//! normalizes every source to the same on-disk shape: a tree of files under
//! the staging directory. Every run emits a `Starting` notice followed by
//! either `Completed` or `Failed`. Any failure is returned as an
//! [`IngestionError`]; files already written stay in place.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::connector_archive::fetch_archive;
use crate::connector_git::{fetch_version_control, GitCli, VcsClient};
use crate::connector_s3::{fetch_object_storage, ObjectStoreProvider, S3Provider};
use crate::connector_sftp::{fetch_remote_file_server, FileTransfer, Ssh2Transfer};
use crate::error::{FetchError, IngestionError};
use crate::models::{SourceDescriptor, SourceKind};
use crate::progress::{IngestEvent, IngestReporter, NoProgress};

/// The staging directory as seen by one connector during one run.
///
/// Connectors write under [`root`](StagingArea::root) and record what they
/// wrote so it can be reported and counted.
pub struct StagingArea<'a> {
    root: &'a Path,
    kind: SourceKind,
    reporter: &'a dyn IngestReporter,
    files: u64,
}

impl<'a> StagingArea<'a> {
    pub fn new(root: &'a Path, kind: SourceKind, reporter: &'a dyn IngestReporter) -> Self {
        Self {
            root,
            kind,
            reporter,
            files: 0,
        }
    }

    pub fn root(&self) -> &Path {
        self.root
    }

    pub fn file_written(&mut self, path: &Path) {
        self.files += 1;
        self.reporter.report(IngestEvent::Fetched {
            source: self.kind,
            path: path.to_path_buf(),
        });
    }

    pub fn dir_created(&mut self, path: &Path) {
        tracing::debug!(path = %path.display(), "created directory");
    }

    /// Files written so far.
    pub fn files(&self) -> u64 {
        self.files
    }
}

/// Outcome of a successful ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub kind: SourceKind,
    pub files: u64,
    pub staging_dir: PathBuf,
}

/// Fetches documents from any supported source into one staging directory.
pub struct Ingestor {
    staging_dir: PathBuf,
    work_dir: PathBuf,
    sftp_port: u16,
    default_branch: String,
    object_stores: Box<dyn ObjectStoreProvider>,
    transfer: Box<dyn FileTransfer>,
    vcs: Box<dyn VcsClient>,
    reporter: Box<dyn IngestReporter>,
}

impl Ingestor {
    /// An ingestor using the production clients (S3 REST, libssh2, git CLI).
    pub fn from_config(config: &Config) -> Self {
        Self {
            staging_dir: config.staging.dir.clone(),
            work_dir: config
                .staging
                .work_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            sftp_port: config.sources.sftp_port,
            default_branch: config.sources.git_default_branch.clone(),
            object_stores: Box::new(S3Provider::new(
                config.sources.s3_region.clone(),
                config.sources.s3_endpoint_url.clone(),
            )),
            transfer: Box::new(Ssh2Transfer),
            vcs: Box::new(GitCli),
            reporter: Box::new(NoProgress),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn IngestReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_object_stores(mut self, provider: Box<dyn ObjectStoreProvider>) -> Self {
        self.object_stores = provider;
        self
    }

    pub fn with_file_transfer(mut self, transfer: Box<dyn FileTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_vcs(mut self, vcs: Box<dyn VcsClient>) -> Self {
        self.vcs = vcs;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Populate the staging directory from `descriptor`.
    ///
    /// The staging directory is created first if it does not exist.
    pub async fn ingest(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<IngestReport, IngestionError> {
        let kind = descriptor.kind();
        self.reporter.report(IngestEvent::Starting { source: kind });
        tracing::info!(source = %kind, staging = %self.staging_dir.display(), "ingestion started");

        let mut staging = StagingArea::new(&self.staging_dir, kind, self.reporter.as_ref());
        let result = match std::fs::create_dir_all(&self.staging_dir) {
            Ok(()) => self.dispatch(descriptor, &mut staging).await,
            Err(e) => Err(FetchError::Io(e)),
        };
        let files = staging.files();

        match result {
            Ok(()) => {
                self.reporter.report(IngestEvent::Completed {
                    source: kind,
                    files,
                });
                tracing::info!(source = %kind, files, "ingestion completed");
                Ok(IngestReport {
                    kind,
                    files,
                    staging_dir: self.staging_dir.clone(),
                })
            }
            Err(cause) => {
                let message = cause.to_string();
                self.reporter.report(IngestEvent::Failed {
                    source: kind,
                    message: message.clone(),
                });
                tracing::error!(source = %kind, files, error = %message, "ingestion failed");
                Err(IngestionError::new(kind, cause))
            }
        }
    }

    async fn dispatch(
        &self,
        descriptor: &SourceDescriptor,
        staging: &mut StagingArea<'_>,
    ) -> Result<(), FetchError> {
        match descriptor {
            SourceDescriptor::Archive { bytes } => fetch_archive(bytes, staging),
            SourceDescriptor::ObjectStorage {
                bucket,
                key_id,
                key_secret,
                prefix,
            } => {
                let store = self.object_stores.client(key_id, key_secret)?;
                fetch_object_storage(store.as_ref(), bucket, prefix, staging).await
            }
            SourceDescriptor::RemoteFileServer {
                hostname,
                username,
                password,
                path,
            } => {
                fetch_remote_file_server(
                    self.transfer.as_ref(),
                    hostname,
                    self.sftp_port,
                    username,
                    password,
                    path,
                    staging,
                )
                .await
            }
            SourceDescriptor::VersionControl {
                repo_url,
                access_token,
                branch,
                path,
            } => {
                let branch = branch.as_deref().unwrap_or(&self.default_branch);
                fetch_version_control(
                    self.vcs.as_ref(),
                    repo_url,
                    access_token,
                    branch,
                    path,
                    &self.work_dir,
                    staging,
                )
                .await
            }
        }
    }
}
