//! Bounded retry for `Transient` Store errors.
//!
//! Wraps a fallible async operation with exponential backoff via the
//! `backoff` crate, retrying only `CoreError::Transient` and giving up
//! after `max_elapsed`. Any other error is returned immediately.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;

use crate::domain::errors::CoreError;

pub async fn with_backoff<T, F, Fut>(max_elapsed: Duration, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(50))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(Some(max_elapsed))
        .build();

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => match backoff.next_backoff() {
                Some(delay) => {
                    tracing::debug!(error = %err, delay_ms = delay.as_millis(), "retrying transient store error");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}
