use std::future::Future;
use std::time::Duration;

/// Runs `fut`, turning an elapsed `limit` into `on_elapsed()`.
pub(crate) async fn within<T, E, F>(
    limit: Duration,
    on_elapsed: impl FnOnce() -> E,
    fut: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_elapsed()),
    }
}
