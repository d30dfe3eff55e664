use std::future::Future;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Errors raised by the note filesystem.
///
/// These abort the current item only; the item's link is not recorded.
#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("Failed to create folder '{path}': {source}")]
    CreateFolder {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write note '{path}': {source}")]
    CreateFile {
        path: String,
        source: std::io::Error,
    },

    /// The note path was taken between the existence check and the write.
    #[error("Note already exists: {0}")]
    AlreadyExists(String),

    /// The path would resolve outside the vault root.
    #[error("Path escapes the vault: {0}")]
    OutsideVault(String),

    #[error("Filesystem error on '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// The note store: existence checks plus folder and file creation.
///
/// Paths are vault-relative and already normalized (forward slashes, no
/// empty or `.` segments).
pub trait Vault: Send + Sync {
    fn exists(&self, path: &str) -> impl Future<Output = Result<bool, FilesystemError>> + Send;

    fn create_folder(&self, path: &str)
        -> impl Future<Output = Result<(), FilesystemError>> + Send;

    /// Creates a new file. Never overwrites an existing one.
    fn create_file(
        &self,
        path: &str,
        content: &str,
    ) -> impl Future<Output = Result<(), FilesystemError>> + Send;
}

/// A vault backed by a directory on local disk.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a vault-relative path onto disk, refusing `..` and absolute
    /// components.
    fn full_path(&self, path: &str) -> Result<PathBuf, FilesystemError> {
        let mut full = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => full.push(part),
                Component::CurDir => {}
                _ => return Err(FilesystemError::OutsideVault(path.to_string())),
            }
        }
        Ok(full)
    }
}

impl Vault for FsVault {
    async fn exists(&self, path: &str) -> Result<bool, FilesystemError> {
        let full = self.full_path(path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|source| FilesystemError::Io {
                path: path.to_string(),
                source,
            })
    }

    async fn create_folder(&self, path: &str) -> Result<(), FilesystemError> {
        let full = self.full_path(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|source| FilesystemError::CreateFolder {
                path: path.to_string(),
                source,
            })
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<(), FilesystemError> {
        let full = self.full_path(path)?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(FilesystemError::AlreadyExists(path.to_string()))
            }
            Err(source) => {
                return Err(FilesystemError::CreateFile {
                    path: path.to_string(),
                    source,
                })
            }
        };

        write_or_discard(&full, &mut file, content)
            .await
            .map_err(|source| FilesystemError::CreateFile {
                path: path.to_string(),
                source,
            })
    }
}

/// Writes `content` to the freshly created file at `full`, removing the file
/// again if the write fails so no truncated note is left behind.
async fn write_or_discard<W: AsyncWrite + Unpin>(
    full: &Path,
    file: &mut W,
    content: &str,
) -> std::io::Result<()> {
    let write = async {
        file.write_all(content.as_bytes()).await?;
        file.flush().await
    };
    if let Err(e) = write.await {
        if let Err(remove) = tokio::fs::remove_file(full).await {
            tracing::warn!(path = %full.display(), error = %remove, "Failed to remove partial note");
        }
        return Err(e);
    }
    Ok(())
}
