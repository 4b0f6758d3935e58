use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

/// Wait before deleting so we never race the game's own write/lock on the
/// file.
const DELETE_DELAY: Duration = Duration::from_millis(500);

/// Best-effort deferred deletion of a processed screenshot. Cancelling the
/// token (listener stop) drops the deletion silently.
pub fn delete_later(path: PathBuf, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(DELETE_DELAY) => {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!("deleted processed screenshot {}", path.display()),
                    Err(err) => warn!("could not delete screenshot {}: {err}", path.display()),
                }
            }
            _ = cancel.cancelled() => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deletes_after_the_delay() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"png").expect("write");

        delete_later(path.clone(), CancellationToken::new());
        assert!(path.exists(), "deletion is deferred, not immediate");

        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if !path.exists() {
                return;
            }
        }
        panic!("screenshot should be gone");
    }

    #[tokio::test]
    async fn cancelled_deletion_keeps_the_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"png").expect("write");

        let token = CancellationToken::new();
        delete_later(path.clone(), token.clone());
        token.cancel();
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(path.exists(), "cancelled janitor must not delete");
    }
}
