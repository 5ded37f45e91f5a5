//! Storage port for tokens and nonces
//!
//! A `Storer` saves and restores one opaque byte record. The library uses one
//! storer for the token (written after each successful exchange) and, in the
//! web flow, a second one for the nonce (overwritten on every authorization
//! attempt). Backends never see structured data; encoding is the caller's job.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::{Error, Result};

/// Boxed future returned by `Storer` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Save/restore capability over a single byte record.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Storer>`), so callers can inject any backend at runtime.
pub trait Storer: Send + Sync {
    /// Replace the stored record with `bytes`.
    fn save<'a>(&'a self, bytes: &'a [u8]) -> StoreFuture<'a, ()>;

    /// Return the stored record. A backend with nothing stored returns
    /// `Error::NotFound`.
    fn restore(&self) -> StoreFuture<'_, Vec<u8>>;
}

/// Stores the record in a single file.
///
/// Writes go through a temp file + rename so a crash mid-write never leaves a
/// truncated token behind. Permissions are 0600 on unix since the file may
/// hold OAuth tokens.
#[derive(Debug, Clone)]
pub struct FileStorer {
    path: PathBuf,
}

impl FileStorer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Storer for FileStorer {
    fn save<'a>(&'a self, bytes: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(write_atomic(&self.path, bytes))
    }

    fn restore(&self) -> StoreFuture<'_, Vec<u8>> {
        Box::pin(async move {
            match tokio::fs::read(&self.path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(
                    format!("{} does not exist", self.path.display()),
                )),
                Err(e) => Err(Error::Io(format!("reading {}: {e}", self.path.display()))),
            }
        })
    }
}

/// Distinguishes temp files of concurrent saves within one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` atomically with owner-only permissions.
///
/// The temp file is removed if any step after its creation fails.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Storage(format!("{} has no file name", path.display())))?
        .to_string_lossy();

    let tmp_path = dir.join(format!(
        ".{file_name}.tmp.{}.{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = write_and_replace(&tmp_path, path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    debug!(path = %path.display(), len = bytes.len(), "persisted record");
    Ok(())
}

async fn write_and_replace(tmp_path: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(tmp_path, bytes)
        .await
        .map_err(|e| Error::Io(format!("writing temp file {}: {e}", tmp_path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting permissions on {}: {e}", tmp_path.display())))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp file to {}: {e}", path.display())))
}

/// Keeps the record in process memory.
///
/// Suitable for a single-process web server where losing state on restart is
/// acceptable (the user simply re-authorizes), and for tests.
#[derive(Debug, Default)]
pub struct MemoryStorer {
    record: Mutex<Option<Vec<u8>>>,
}

impl MemoryStorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record, without going through the async port.
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Storer for MemoryStorer {
    fn save<'a>(&'a self, bytes: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            *self
                .record
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(bytes.to_vec());
            Ok(())
        })
    }

    fn restore(&self) -> StoreFuture<'_, Vec<u8>> {
        Box::pin(async move {
            self.snapshot()
                .ok_or_else(|| Error::NotFound("no record stored in memory".into()))
        })
    }
}
