use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::collaborators::{OutputSink, RemoteResult};
use crate::error::RemoteError;

/// Filesystem-backed output sink.
///
/// Layout: `<root>/<relative path>`; parent directories are created on demand.
pub struct FsOutputSink {
    root: PathBuf,
}

impl FsOutputSink {
    /// Create a new `FsOutputSink` rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> RemoteResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> RemoteResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || path.is_empty() {
            return Err(RemoteError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("output path must stay inside the sink root: {}", path),
            )));
        }
        Ok(self.root.join(relative))
    }
}

/// Atomic write: temp file in the target directory, then rename over `target`.
fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl OutputSink for FsOutputSink {
    async fn write(&self, path: &str, contents: &[u8]) -> RemoteResult<()> {
        let target = self.resolve(path)?;
        let contents = contents.to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&target, &contents))
            .await
            .map_err(|e| RemoteError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        Ok(())
    }
}
