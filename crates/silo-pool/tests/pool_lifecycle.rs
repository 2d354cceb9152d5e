//! Pool lifecycle integration tests.
//!
//! These tests exercise the pool end to end against the scriptable
//! in-memory driver from `silo-testing`: admission ordering, queueing,
//! retries, idle expiry, events, the error log, and shutdown. No real
//! server is required and no test depends on wall-clock time; timed
//! behavior runs under Tokio's paused clock.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::yield_now;

use silo_driver::Driver;
use silo_pool::{Pool, PoolError, PoolEvent};
use silo_testing::MockDriver;

/// Collect every event the pool emits into a shared vector.
fn capture_events(pool: &Pool) -> Arc<Mutex<Vec<PoolEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    pool.on_event(move |event| sink.lock().push(event.clone()));
    events
}

/// Let spawned tasks run to completion on the current-thread runtime.
async fn settle() {
    for _ in 0..10 {
        yield_now().await;
    }
}

// =============================================================================
// Admission: reuse, creation, queueing, rejection
// =============================================================================

#[tokio::test]
async fn test_idle_connection_is_reused_before_creating() {
    let driver = Arc::new(MockDriver::reliable());
    let pool = Pool::builder().driver(Arc::clone(&driver) as Arc<dyn Driver>).build().unwrap();

    let mut first = pool.request().await.unwrap();
    let first_id = first.id();
    first.release().unwrap();
    assert_eq!(pool.idle_count().unwrap(), 1);

    let second = pool.request().await.unwrap();
    assert_eq!(second.id(), first_id);
    assert_eq!(driver.connect_attempts(), 1);
    assert_eq!(pool.acquired_count().unwrap(), 1);
    assert_eq!(pool.idle_count().unwrap(), 0);
}

#[tokio::test]
async fn test_dead_idle_connections_are_drained() {
    let driver = Arc::new(MockDriver::reliable());
    driver.hand_out_dead_connections();
    let pool = Pool::builder().driver(Arc::clone(&driver) as Arc<dyn Driver>).build().unwrap();
    let events = capture_events(&pool);

    // Creation does not probe liveness, so the dead connection is handed
    // out and parked in the idle queue on release.
    let mut first = pool.request().await.unwrap();
    let first_id = first.id();
    first.release().unwrap();

    // Reuse probes liveness, closes the corpse, and creates a fresh one.
    let second = pool.request().await.unwrap();
    assert_ne!(second.id(), first_id);
    assert_eq!(driver.connect_attempts(), 2);
    assert_eq!(pool.idle_count().unwrap(), 0);
    assert!(events.lock().contains(&PoolEvent::CloseSuccess));
}

#[tokio::test]
async fn test_drains_dead_idles_until_an_alive_one() {
    let driver = Arc::new(MockDriver::reliable());
    driver.hand_out_dead_connections();
    let pool = Pool::builder().driver(Arc::clone(&driver) as Arc<dyn Driver>).build().unwrap();

    // Park a dead connection (oldest) and an alive one (newer) in the
    // idle queue.
    let mut dead = pool.request().await.unwrap();
    driver.hand_out_healthy_connections();
    let mut alive = pool.request().await.unwrap();
    let alive_id = alive.id();
    dead.release().unwrap();
    alive.release().unwrap();
    assert_eq!(pool.idle_count().unwrap(), 2);

    // The dead one is closed in passing; the alive one is handed out
    // with no factory call.
    let reused = pool.request().await.unwrap();
    assert_eq!(reused.id(), alive_id);
    assert_eq!(driver.connect_attempts(), 2);
    assert_eq!(pool.idle_count().unwrap(), 0);
    assert_eq!(pool.acquired_count().unwrap(), 1);
}

#[tokio::test]
async fn test_requests_queue_in_fifo_order() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .max_connections(1)
        .max_queue_time(Duration::from_secs(60))
        .build()
        .unwrap();

    let mut first = pool.request().await.unwrap();
    let first_id = first.id();

    let order = Arc::new(Mutex::new(Vec::new()));

    let worker = |name: &'static str| {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            let mut connection = pool.request().await.unwrap();
            order.lock().push((name, connection.id()));
            connection.release().unwrap();
        })
    };

    let second = worker("second");
    settle().await;
    assert_eq!(pool.request_count().unwrap(), 1);
    let third = worker("third");
    settle().await;
    assert_eq!(pool.request_count().unwrap(), 2);

    // One release serves both waiters, oldest first, reusing the same
    // underlying connection.
    first.release().unwrap();
    second.await.unwrap();
    third.await.unwrap();

    assert_eq!(
        *order.lock(),
        vec![("second", first_id), ("third", first_id)]
    );
    assert_eq!(pool.request_count().unwrap(), 0);
    assert_eq!(pool.acquired_count().unwrap(), 0);
    assert_eq!(pool.idle_count().unwrap(), 1);
}

#[tokio::test]
async fn test_full_queue_rejects_new_requests() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .max_connections(1)
        .max_queue_size(Some(1))
        .max_queue_time(Duration::from_secs(60))
        .build()
        .unwrap();
    let events = capture_events(&pool);

    let mut held = pool.request().await.unwrap();
    let held_id = held.id();

    let queued = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let connection = pool.request().await.unwrap();
            connection.id()
        })
    };
    settle().await;
    assert_eq!(pool.request_count().unwrap(), 1);

    // The queue slot is taken; the third request is turned away.
    let rejected = pool.request().await;
    assert!(matches!(rejected, Err(PoolError::MaxQueueSize)));
    assert!(events.lock().contains(&PoolEvent::MaxQueueSize));

    let log = pool.errors().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, "MaxQueueSizeError");

    held.release().unwrap();
    assert_eq!(queued.await.unwrap(), held_id);
    assert_eq!(pool.request_count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_times_out() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .max_connections(1)
        .max_queue_time(Duration::from_millis(200))
        .build()
        .unwrap();
    let events = capture_events(&pool);

    let _held = pool.request().await.unwrap();
    let queued = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.request().await })
    };
    settle().await;
    assert_eq!(pool.request_count().unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    settle().await;

    let outcome = queued.await.unwrap();
    assert!(matches!(outcome, Err(PoolError::MaxQueueTime)));
    assert_eq!(pool.request_count().unwrap(), 0);
    assert!(events.lock().contains(&PoolEvent::MaxQueueTime));

    let log = pool.errors().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, "MaxQueueTimeError");
}

#[tokio::test]
async fn test_rejects_at_capacity_when_queueing_disabled() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .max_connections(1)
        .should_queue(false)
        .build()
        .unwrap();
    let events = capture_events(&pool);

    let _held = pool.request().await.unwrap();
    let rejected = pool.request().await;
    assert!(matches!(rejected, Err(PoolError::MaxConnection)));
    assert!(events.lock().contains(&PoolEvent::MaxConnection));
    assert_eq!(pool.errors().unwrap()[0].kind, "MaxConnectionError");
}

// =============================================================================
// Creation retry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_create_retries_until_exhausted() {
    let driver = Arc::new(MockDriver::always_failing());
    let pool = Pool::builder().driver(Arc::clone(&driver) as Arc<dyn Driver>).build().unwrap();
    let events = capture_events(&pool);

    let outcome = pool.request().await;
    // Default max_retry is 3: one immediate attempt plus two delayed
    // retries, with the last failure surfaced verbatim.
    assert_eq!(driver.connect_attempts(), 3);
    match outcome {
        Err(PoolError::CreateConnection { message }) => {
            assert!(message.contains("attempt 3"), "message: {message}");
        }
        other => panic!("expected CreateConnection error, got {other:?}"),
    }

    assert_eq!(pool.errors().unwrap()[0].kind, "CreateConnectionError");
    assert!(matches!(
        events.lock().as_slice(),
        [PoolEvent::CreateFail { .. }]
    ));
    assert_eq!(pool.acquired_count().unwrap(), 0);
}

#[tokio::test]
async fn test_create_does_not_retry_when_disabled() {
    let driver = Arc::new(MockDriver::always_failing());
    let pool = Pool::builder()
        .driver(Arc::clone(&driver) as Arc<dyn Driver>)
        .should_retry(false)
        .build()
        .unwrap();

    assert!(pool.request().await.is_err());
    assert_eq!(driver.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_recovers_within_retry_budget() {
    let driver = Arc::new(MockDriver::failing_first(2));
    let pool = Pool::builder().driver(Arc::clone(&driver) as Arc<dyn Driver>).build().unwrap();
    let events = capture_events(&pool);

    let connection = pool.request().await.unwrap();
    assert_eq!(driver.connect_attempts(), 3);
    assert_eq!(
        *events.lock(),
        vec![PoolEvent::CreateSuccess {
            connection_id: connection.id()
        }]
    );
    assert!(pool.errors().unwrap().is_empty());
}

// =============================================================================
// Idle expiry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_connection_expires_and_closes() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .max_idle_time(Duration::from_millis(100))
        .build()
        .unwrap();
    let events = capture_events(&pool);

    let mut connection = pool.request().await.unwrap();
    connection.release().unwrap();
    assert_eq!(pool.idle_count().unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;

    assert_eq!(pool.idle_count().unwrap(), 0);
    assert!(events.lock().contains(&PoolEvent::CloseSuccess));
    assert!(pool.errors().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_expiry_records_close_failures() {
    let driver = Arc::new(MockDriver::reliable());
    driver.hand_out_unclosable_connections();
    let pool = Pool::builder()
        .driver(Arc::clone(&driver) as Arc<dyn Driver>)
        .max_idle_time(Duration::from_millis(100))
        .should_retry(false)
        .build()
        .unwrap();
    let events = capture_events(&pool);

    let mut connection = pool.request().await.unwrap();
    let connection_id = connection.id();
    connection.release().unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;

    // The connection is evicted either way; the failure is observable
    // through the event and the log, not through any caller.
    assert_eq!(pool.idle_count().unwrap(), 0);
    assert!(events.lock().iter().any(|event| matches!(
        event,
        PoolEvent::CloseFail { connection_id: id, .. } if *id == connection_id
    )));
    assert_eq!(pool.errors().unwrap()[0].kind, "CloseConnectionError");
}

// =============================================================================
// Borrowed handles
// =============================================================================

#[tokio::test]
async fn test_handle_is_single_use() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .build()
        .unwrap();

    let mut connection = pool.request().await.unwrap();
    connection.release().unwrap();
    assert!(connection.is_released());

    assert!(matches!(
        connection.release(),
        Err(PoolError::ConnectionReleased)
    ));
    assert!(matches!(
        connection.query("SELECT 1", &[]).await,
        Err(PoolError::ConnectionReleased)
    ));
}

#[tokio::test]
async fn test_dropped_handle_returns_connection() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .build()
        .unwrap();

    {
        let _connection = pool.request().await.unwrap();
        assert_eq!(pool.acquired_count().unwrap(), 1);
    }
    assert_eq!(pool.acquired_count().unwrap(), 0);
    assert_eq!(pool.idle_count().unwrap(), 1);
}

#[tokio::test]
async fn test_query_failure_is_emitted_and_logged() {
    let driver = Arc::new(MockDriver::reliable());
    driver.hand_out_failing_queries("table is on fire");
    let pool = Pool::builder().driver(Arc::clone(&driver) as Arc<dyn Driver>).build().unwrap();
    let events = capture_events(&pool);

    let connection = pool.request().await.unwrap();
    let outcome = connection.query("SELECT 1", &[]).await;
    match outcome {
        Err(PoolError::QueryFail { message }) => {
            assert!(message.contains("table is on fire"), "message: {message}");
        }
        other => panic!("expected QueryFail error, got {other:?}"),
    }

    assert!(events
        .lock()
        .iter()
        .any(|event| matches!(event, PoolEvent::QueryFail { .. })));
    assert_eq!(pool.errors().unwrap()[0].kind, "QueryFailError");
}

// =============================================================================
// Pool-level query sugar
// =============================================================================

#[tokio::test]
async fn test_pool_query_borrows_and_returns() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .build()
        .unwrap();
    let events = capture_events(&pool);

    let result = pool.query("SELECT 1", &[]).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(pool.acquired_count().unwrap(), 0);
    assert_eq!(pool.idle_count().unwrap(), 1);
    assert!(events
        .lock()
        .iter()
        .any(|event| matches!(event, PoolEvent::QuerySuccess { rows: 1 })));
}

#[tokio::test]
async fn test_pool_query_returns_connection_on_failure() {
    let driver = Arc::new(MockDriver::reliable());
    driver.hand_out_failing_queries("nope");
    let pool = Pool::builder().driver(Arc::clone(&driver) as Arc<dyn Driver>).build().unwrap();

    assert!(matches!(
        pool.query("SELECT 1", &[]).await,
        Err(PoolError::QueryFail { .. })
    ));
    assert_eq!(pool.acquired_count().unwrap(), 0);
    assert_eq!(pool.idle_count().unwrap(), 1);
}

// =============================================================================
// Error log
// =============================================================================

#[tokio::test]
async fn test_record_error_validates_message() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .build()
        .unwrap();

    pool.record_error(&PoolError::MaxConnection).unwrap();
    let log = pool.errors().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, "MaxConnectionError");
    assert_eq!(log[0].pool_id, pool.id());

    let empty = PoolError::CreateConnection {
        message: "   ".into(),
    };
    assert!(matches!(
        pool.record_error(&empty),
        Err(PoolError::InvalidError(_))
    ));
    assert_eq!(pool.errors().unwrap().len(), 1);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_closes_everything_and_is_terminal() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .build()
        .unwrap();
    let events = capture_events(&pool);

    let _held = pool.request().await.unwrap();
    let mut returned = pool.request().await.unwrap();
    returned.release().unwrap();
    assert_eq!(pool.acquired_count().unwrap(), 1);
    assert_eq!(pool.idle_count().unwrap(), 1);

    pool.shutdown().await.unwrap();
    assert!(pool.is_closed());
    // Both the acquired and the idle connection were closed.
    assert_eq!(
        events
            .lock()
            .iter()
            .filter(|event| **event == PoolEvent::CloseSuccess)
            .count(),
        2
    );

    assert!(matches!(pool.request().await, Err(PoolError::Closed)));
    assert!(matches!(pool.acquired_count(), Err(PoolError::Closed)));
    assert!(matches!(pool.errors(), Err(PoolError::Closed)));
    assert!(matches!(
        pool.record_error(&PoolError::MaxConnection),
        Err(PoolError::Closed)
    ));
    assert!(matches!(pool.shutdown().await, Err(PoolError::Closed)));
}

#[tokio::test]
async fn test_failed_shutdown_leaves_pool_operable() {
    let driver = Arc::new(MockDriver::reliable());
    driver.hand_out_unclosable_connections();
    let pool = Pool::builder()
        .driver(Arc::clone(&driver) as Arc<dyn Driver>)
        .should_retry(false)
        .build()
        .unwrap();

    let mut connection = pool.request().await.unwrap();
    connection.release().unwrap();

    match pool.shutdown().await {
        Err(PoolError::ShutdownFailed { failures }) => assert_eq!(failures.len(), 1),
        other => panic!("expected ShutdownFailed, got {other:?}"),
    }

    // The pool did not close: it keeps serving requests and keeps its
    // error log, so the failure can be diagnosed and shutdown retried.
    assert!(!pool.is_closed());
    assert_eq!(pool.errors().unwrap()[0].kind, "CloseConnectionError");
    assert!(pool.request().await.is_ok());
}

#[tokio::test]
async fn test_shutdown_fails_queued_waiters() {
    let pool = Pool::builder()
        .driver(silo_testing::reliable_driver())
        .max_connections(1)
        .max_queue_time(Duration::from_secs(60))
        .build()
        .unwrap();

    let mut held = pool.request().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.request().await })
    };
    settle().await;
    assert_eq!(pool.request_count().unwrap(), 1);

    // Shutdown closes the held connection out from under the handle and
    // drops the queued waiter, which observes a queue timeout.
    pool.shutdown().await.unwrap();
    let outcome = waiter.await.unwrap();
    assert!(matches!(outcome, Err(PoolError::MaxQueueTime)));

    // Releasing after shutdown quietly fails; the handle just reports
    // itself spent.
    assert!(matches!(held.release(), Err(PoolError::Closed)));
}
