use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Wall-clock milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Length of a file, guarded by a timeout.
///
/// Shared-filesystem metadata calls can hang; the lookup runs on the
/// blocking pool and is abandoned after `timeout`. Any failure (missing
/// file, I/O error, timeout) is `None`; callers decide whether that is
/// a retry or a metric bump.
pub async fn file_len(path: &Path, timeout: Duration) -> Option<u64> {
    stat(path, timeout).await.map(|m| m.len())
}

/// Modification time of a file in epoch milliseconds, guarded like
/// [`file_len`].
pub async fn file_mtime_ms(path: &Path, timeout: Duration) -> Option<u64> {
    let meta = stat(path, timeout).await?;
    let mtime = meta.modified().ok()?;
    Some(
        mtime
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64,
    )
}

async fn stat(path: &Path, timeout: Duration) -> Option<std::fs::Metadata> {
    let owned = path.to_path_buf();
    let lookup = tokio::task::spawn_blocking(move || std::fs::metadata(owned));
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(Ok(meta))) => Some(meta),
        Ok(Ok(Err(_))) => None,
        Ok(Err(join)) => {
            warn!(path = %path.display(), error = %join, "metadata task failed");
            None
        }
        Err(_) => {
            warn!(path = %path.display(), timeout_ms = timeout.as_millis() as u64, "metadata lookup timed out");
            None
        }
    }
}
