//! Retrying statement executor on top of the shared pool.
//!
//! Transient failures are retried with a linear backoff capped at one second.
//! Every attempt and every sleep is bounded by the caller's deadline.

use sqlx::PgConnection;
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::db::connection::PoolManager;
use crate::error::StoreError;

/// Future returned by a statement closure; borrows the connection it runs on.
pub type StatementFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, sqlx::Error>> + Send + 'c>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.db_max_attempts.max(1),
            ..Self::default()
        }
    }

    /// `min(base * attempt, max)` for the 1-based attempt that just failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Not retried.
    Fatal,
    /// The borrowed connection is unusable and must not go back to the pool.
    BrokenConnection,
    /// Retry is worthwhile but the connection (if any) is healthy.
    Busy,
    /// The pool itself is gone and has to be rebuilt before the next attempt.
    PoolClosed,
}

impl FailureClass {
    pub fn is_transient(self) -> bool {
        self != FailureClass::Fatal
    }
}

pub fn classify(err: &sqlx::Error) -> FailureClass {
    match err {
        sqlx::Error::Io(io) => match io.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FailureClass::Busy,
            _ => FailureClass::BrokenConnection,
        },
        sqlx::Error::Protocol(_) => FailureClass::BrokenConnection,
        sqlx::Error::PoolTimedOut => FailureClass::Busy,
        sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => FailureClass::PoolClosed,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(code) if code.starts_with("08") => FailureClass::BrokenConnection,
            Some("57P01") | Some("57P02") | Some("57P03") => FailureClass::BrokenConnection,
            Some("57014") => FailureClass::Busy,
            _ => FailureClass::Fatal,
        },
        _ => FailureClass::Fatal,
    }
}

/// Drives `attempt` until it succeeds, fails non-transiently, runs out of
/// attempts, or crosses `deadline`.
pub async fn retry_until<T, Op, Fut>(
    policy: &RetryPolicy,
    deadline: Instant,
    mut attempt: Op,
) -> Result<T, StoreError>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut number = 1;
    loop {
        let err = match tokio::time::timeout_at(deadline, attempt(number)).await {
            Err(_) => return Err(StoreError::DeadlineExceeded),
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
        };

        if !classify(&err).is_transient() {
            return Err(StoreError::Database(err));
        }
        if number >= policy.max_attempts {
            return Err(StoreError::Transient {
                attempts: number,
                source: err,
            });
        }

        let delay = policy.delay_for(number);
        if Instant::now() + delay >= deadline {
            return Err(StoreError::DeadlineExceeded);
        }
        tracing::warn!(
            attempt = number,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient store failure, retrying"
        );
        tokio::time::sleep(delay).await;
        number += 1;
    }
}

/// Statement runner shared by every repository.
#[derive(Clone)]
pub struct Executor {
    pools: Arc<dyn PoolManager>,
    policy: RetryPolicy,
    call_deadline: Duration,
}

impl Executor {
    pub fn new(pools: Arc<dyn PoolManager>, policy: RetryPolicy, call_deadline: Duration) -> Self {
        Self {
            pools,
            policy,
            call_deadline,
        }
    }

    /// Deadline for a call starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.call_deadline
    }

    /// Runs `op` on a pooled connection with retries, bounded by `deadline`.
    pub async fn run<T, F>(&self, deadline: Instant, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: for<'c> Fn(&'c mut PgConnection) -> StatementFuture<'c, T>
            + Send
            + Sync
            + 'static,
    {
        let op = Arc::new(op);
        retry_until(&self.policy, deadline, |attempt| {
            let pools = Arc::clone(&self.pools);
            let op = Arc::clone(&op);
            async move { run_attempt(pools.as_ref(), attempt, op.as_ref()).await }
        })
        .await
    }
}

/// Round-trips a trivial statement through the executor.
pub async fn ping(executor: &Executor) -> Result<(), StoreError> {
    executor
        .run(executor.deadline(), |conn| {
            Box::pin(async move { sqlx::query("SELECT 1").execute(&mut *conn).await.map(|_| ()) })
        })
        .await
}

async fn run_attempt<T, F>(pools: &dyn PoolManager, attempt: u32, op: &F) -> Result<T, sqlx::Error>
where
    F: for<'c> Fn(&'c mut PgConnection) -> StatementFuture<'c, T>,
{
    let lease = pools.lease().await?;
    let mut conn = match lease.pool.acquire().await {
        Ok(conn) => conn,
        Err(err) => {
            if classify(&err) == FailureClass::PoolClosed {
                recreate_pool(pools, lease.generation).await;
            }
            return Err(err);
        }
    };

    match op(&mut *conn).await {
        Ok(value) => Ok(value),
        Err(err) => {
            match classify(&err) {
                FailureClass::BrokenConnection => {
                    tracing::debug!(attempt, "discarding broken connection");
                    drop(conn.detach());
                }
                FailureClass::PoolClosed => {
                    drop(conn);
                    recreate_pool(pools, lease.generation).await;
                }
                FailureClass::Busy | FailureClass::Fatal => drop(conn),
            }
            Err(err)
        }
    }
}

async fn recreate_pool(pools: &dyn PoolManager, generation: u64) {
    if let Err(err) = pools.recreate(generation).await {
        tracing::error!(generation, error = %err, "failed to recreate database pool");
    }
}
