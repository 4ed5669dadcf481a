use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use tokio::fs::File;
use tracing::info;
use tracing::warn;

use crate::exception::CoreRsResult;

/// File owned by the current scope, removed from disk when dropped.
///
/// The guard is taken before the file is created, so a failure while creating or writing
/// still removes whatever reached the disk.
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    pub async fn create(path: PathBuf) -> CoreRsResult<(Self, File)> {
        let scoped_file = ScopedFile { path };
        let file = File::create(&scoped_file.path).await.map_err(|err| {
            exception!(
                message = format!("failed to create file, path={}", scoped_file.path.to_string_lossy()),
                source = err
            )
        })?;
        Ok((scoped_file, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("local file deleted, path={}", self.path.to_string_lossy()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("failed to delete local file, path={}, error={err}", self.path.to_string_lossy()),
        }
    }
}
