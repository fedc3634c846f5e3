use std::future::Future;
use std::time::Duration;

use crate::{GaslessError, Result};

/// Await `fut` for at most `limit`, mapping an elapsed deadline to
/// [`GaslessError::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GaslessError::Timeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}
