// ── Operation executor ──
//
// Runs validated CRUD operations against the remote store with a
// per-attempt deadline, bounded retries for retryable failures, and
// cache-aside reads. Every call resolves to an `OperationResult`;
// nothing here panics or returns an error to the caller.

mod backoff;
mod store;

use std::sync::Arc;

use futures_util::future::join_all;
use syncdesk_api::Error as ApiError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::classify::classify;
use crate::config::ExecutorConfig;
use crate::error::ErrorKind;
use crate::model::{CrudOperation, ExecuteOptions, OperationResult};

pub use store::RecordStore;

/// Executes CRUD operations with retry, timeout, and caching.
#[derive(Debug)]
pub struct OperationExecutor<S> {
    store: S,
    cache: Arc<CacheStore>,
    config: ExecutorConfig,
}

impl<S: RecordStore> OperationExecutor<S> {
    pub fn new(store: S, cache: Arc<CacheStore>, config: ExecutorConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one operation to completion.
    ///
    /// Reads consult the cache first unless `skip_cache` is set; a
    /// successful read writes its result through. A successful write
    /// invalidates every cached read for the table. Retryable failures
    /// are retried up to `retry_attempts` times with exponential backoff,
    /// so the store sees at most `retry_attempts + 1` calls.
    pub async fn execute(&self, op: &CrudOperation, options: ExecuteOptions) -> OperationResult {
        let started = Instant::now();

        if let Err(e) = op.validate() {
            debug!(
                table = %op.table(),
                operation = %op.operation(),
                error = %e,
                "operation rejected"
            );
            return OperationResult::rejected(&e, started.elapsed());
        }

        let is_read = op.operation().is_read();
        let cache_key = is_read.then(|| CacheKey::for_operation(op));

        if let Some(key) = cache_key.as_ref().filter(|_| !options.skip_cache) {
            if let Some(hit) = self.cache.get(key) {
                debug!(key = %key, "served from cache");
                return OperationResult::success(200, (*hit).clone(), started.elapsed(), true);
            }
        }

        // Captured before the remote call so a write finishing while the
        // read is in flight keeps the read's result out of the cache.
        let generation = cache_key.as_ref().map(|key| self.cache.generation(key.group()));

        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let max_retries = options.retry_attempts.unwrap_or(self.config.retry_attempts);
        let mut attempt: u32 = 0;

        loop {
            let outcome = match tokio::time::timeout(timeout, self.store.call(op)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ApiError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

            match outcome {
                Ok(response) => {
                    match (&cache_key, generation) {
                        (Some(key), Some(generation)) => {
                            let ttl = self.config.ttl_for(op.table());
                            let data = response.data.clone();
                            if !self.cache.set_if_current(key, data, ttl, generation) {
                                debug!(key = %key, "table changed during read, result not cached");
                            }
                        }
                        _ => {
                            self.cache.invalidate_group(op.table().as_ref());
                        }
                    }
                    debug!(
                        table = %op.table(),
                        operation = %op.operation(),
                        status = response.status,
                        attempts = attempt + 1,
                        "operation succeeded"
                    );
                    return OperationResult::success(
                        response.status,
                        response.data,
                        started.elapsed(),
                        false,
                    );
                }
                Err(err) => {
                    let verdict = classify(&err);

                    if verdict.retryable && attempt < max_retries {
                        let delay = backoff::retry_delay(
                            attempt,
                            self.config.backoff_base,
                            self.config.backoff_max,
                            verdict.retry_after,
                        );
                        warn!(
                            table = %op.table(),
                            operation = %op.operation(),
                            kind = %verdict.kind,
                            attempt = attempt + 1,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "retryable failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    // A write that may have reached the store leaves
                    // cached reads for the table untrustworthy.
                    if !is_read
                        && matches!(verdict.kind, ErrorKind::Timeout | ErrorKind::NetworkError)
                    {
                        self.cache.invalidate_group(op.table().as_ref());
                    }

                    info!(
                        table = %op.table(),
                        operation = %op.operation(),
                        kind = %verdict.kind,
                        status = verdict.status,
                        attempts = attempt + 1,
                        "operation failed"
                    );
                    return OperationResult::failure(
                        verdict.kind,
                        verdict.status,
                        verdict.message,
                        started.elapsed(),
                    );
                }
            }
        }
    }

    /// Run several operations concurrently with default options.
    ///
    /// Results come back in input order; one failure does not affect the
    /// others.
    pub async fn execute_batch(&self, ops: &[CrudOperation]) -> Vec<OperationResult> {
        join_all(ops.iter().map(|op| self.execute(op, ExecuteOptions::default()))).await
    }
}
