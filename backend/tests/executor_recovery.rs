use sqlx::PgPool;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};

mod support;
use support::pg_executor;

#[sqlx::test]
async fn broken_connection_is_discarded_and_the_call_retried(pool: PgPool) {
    let (pools, executor) = pg_executor(pool);
    let calls = Arc::new(AtomicU32::new(0));
    let backends = Arc::new(Mutex::new(Vec::<i32>::new()));

    let (calls_in, backends_in) = (Arc::clone(&calls), Arc::clone(&backends));
    let result = executor
        .run(executor.deadline(), move |conn| {
            let calls = Arc::clone(&calls_in);
            let backends = Arc::clone(&backends_in);
            Box::pin(async move {
                let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
                    .fetch_one(&mut *conn)
                    .await?;
                backends.lock().expect("lock").push(pid);
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    // The server ends this session with SQLSTATE 57P01.
                    sqlx::query("SELECT pg_terminate_backend(pg_backend_pid())")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("SELECT 1").execute(&mut *conn).await?;
                }
                Ok::<_, sqlx::Error>(pid)
            })
        })
        .await;

    let pid = result.expect("second attempt succeeds on a fresh connection");
    let backends = backends.lock().expect("lock").clone();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(backends.len(), 2);
    assert_ne!(backends[0], backends[1]);
    assert_eq!(pid, backends[1]);
    assert!(pools.recreated.lock().expect("lock").is_empty());
}

#[sqlx::test]
async fn pool_closed_inside_a_statement_recreates_the_pool_once(pool: PgPool) {
    let (pools, executor) = pg_executor(pool);
    let calls = Arc::new(AtomicU32::new(0));

    let calls_in = Arc::clone(&calls);
    let result = executor
        .run(executor.deadline(), move |conn| {
            let calls = Arc::clone(&calls_in);
            Box::pin(async move {
                sqlx::query("SELECT 1").execute(&mut *conn).await?;
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(sqlx::Error::PoolClosed);
                }
                Ok::<_, sqlx::Error>(())
            })
        })
        .await;

    result.expect("retried after recreation");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*pools.recreated.lock().expect("lock"), vec![0]);
    assert_eq!(pools.generation(), 1);
}

#[sqlx::test]
async fn non_transient_errors_are_not_retried(pool: PgPool) {
    let (pools, executor) = pg_executor(pool);
    let calls = Arc::new(AtomicU32::new(0));

    let calls_in = Arc::clone(&calls);
    let result = executor
        .run(executor.deadline(), move |conn| {
            let calls = Arc::clone(&calls_in);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sqlx::query("SELECT * FROM no_such_table")
                    .execute(&mut *conn)
                    .await
                    .map(|_| ())
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(streamdesk_backend::error::StoreError::Database(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(pools.generation(), 0);
}
