//! Filesystem-backed content store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

use super::{ContentStore, StoreError, normalize_path, normalize_prefix};

const TEMP_SUFFIX: &str = ".partial";

/// Stores artifacts as files below a root directory.
///
/// Writes land in a hidden temporary sibling first and are renamed into
/// place, so concurrent writers to one path never interleave bytes.
#[derive(Debug)]
pub struct FsContentStore {
    id: String,
    root: PathBuf,
}

impl FsContentStore {
    /// Open the store rooted at `root`, creating the directory if necessary.
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)
            .map_err(|err| StoreError::io("open", &root.display().to_string(), err))?;
        Ok(Self {
            id: format!("fs:{}", root.display()),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf), StoreError> {
        let normalized = normalize_path(path)?;
        let absolute = self.root.join(&normalized);
        Ok((normalized, absolute))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        let (normalized, absolute) = self.resolve(path)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io("read", &normalized, err)),
        }
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        let (normalized, absolute) = self.resolve(path)?;
        let parent = absolute
            .parent()
            .ok_or_else(|| StoreError::InvalidPath {
                path: normalized.clone(),
            })?
            .to_path_buf();
        let file_name = absolute
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::InvalidPath {
                path: normalized.clone(),
            })?;

        fs::create_dir_all(&parent)
            .await
            .map_err(|err| StoreError::io("write", &normalized, err))?;

        let temp = parent.join(format!(".{file_name}.{}{TEMP_SUFFIX}", Uuid::new_v4()));
        if let Err(err) = write_file(&temp, &bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StoreError::io("write", &normalized, err));
        }

        if let Err(err) = fs::rename(&temp, &absolute).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StoreError::io("write", &normalized, err));
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<bool, StoreError> {
        let (normalized, absolute) = self.resolve(path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::io("remove", &normalized, err)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let normalized = normalize_prefix(prefix)?;
        let start = if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&normalized)
        };

        let mut found = Vec::new();
        let mut pending = vec![start];
        while let Some(directory) = pending.pop() {
            let mut entries = match fs::read_dir(&directory).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StoreError::io("list", &normalized, err)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| StoreError::io("list", &normalized, err))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|err| StoreError::io("list", &normalized, err))?;
                let entry_path = entry.path();
                if file_type.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                if is_temporary(&entry_path) {
                    continue;
                }
                match relative_key(&self.root, &entry_path) {
                    Some(key) => found.push(key),
                    None => warn!(
                        op = "fs_store::list",
                        path = %entry_path.display(),
                        "Skipping store entry with a non UTF-8 path"
                    ),
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn is_temporary(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name.ends_with(TEMP_SUFFIX))
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}
