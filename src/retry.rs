use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::errors::RetryError;

/// How many times a deadlocked statement is retried before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Driver messages that mark transient lock contention.
///
/// The singleton-exclusion subquery is not atomic with its outer update, so
/// these are expected under load rather than exceptional.
const CONTENTION_MESSAGES: [&str; 2] = [
    "Lock wait timeout exceeded",
    "Deadlock found when trying to get lock",
];

fn is_transient_lock_contention(message: &str) -> bool {
    CONTENTION_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}

/// Runs `op`, retrying transient lock contention up to `max_retries` times
/// with a uniform 0–100 ms jitter between attempts.
///
/// Every error leaving this function is a [`RetryError`] carrying the
/// original driver message: retry exhaustion and non-retryable errors look
/// the same to the type system and differ only in message.
pub async fn retry_on_deadlock<T, E, F, Fut>(
    max_retries: u32,
    mut op: F,
) -> core::result::Result<T, RetryError>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = core::result::Result<T, E>>,
{
    let mut retries_left = max_retries;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let message = error.to_string();
                if retries_left == 0 || !is_transient_lock_contention(&message) {
                    return Err(RetryError::new(message));
                }

                retries_left -= 1;
                debug!(retries_left, "Retrying after lock contention");
                let jitter = Duration::from_secs_f64(rand::rng().random::<f64>() * 0.1);
                tokio::time::sleep(jitter).await;
            }
        }
    }
}
