//! Integration tests for token bucket admission

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use random_mod_collector::api::{Lease, RateLimiter, RateLimiterOptions, ThrottledSender};
use random_mod_collector::shutdown::{Cancelled, ShutdownCoordinator};

use crate::support::{status_response, ScriptedTransport};

fn one_per_second(queue_limit: usize) -> RateLimiter {
    RateLimiter::new(RateLimiterOptions {
        token_limit: 1,
        tokens_per_period: 1,
        replenishment_period: Duration::from_secs(1),
        queue_limit,
    })
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_sequential_acquires_are_spaced() {
    let limiter = one_per_second(60);
    let shutdown = ShutdownCoordinator::new();
    let started = Instant::now();

    for _ in 0..5 {
        assert_eq!(limiter.acquire(&shutdown).await.unwrap(), Lease::Granted);
    }

    assert!(started.elapsed() >= Duration::from_secs(4));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_spacing_holds_after_idle_partial_period() {
    let limiter = one_per_second(60);
    let shutdown = ShutdownCoordinator::new();
    tokio::time::advance(Duration::from_millis(5900)).await;

    let started = Instant::now();
    let mut grants = Vec::new();
    for _ in 0..3 {
        assert_eq!(limiter.acquire(&shutdown).await.unwrap(), Lease::Granted);
        grants.push(started.elapsed());
    }

    assert_eq!(grants[0], Duration::ZERO);
    for pair in grants.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(1), "grants at {grants:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_waiters_served_oldest_first() {
    let limiter = Arc::new(one_per_second(10));
    let shutdown = ShutdownCoordinator::shared();
    assert!(limiter.try_acquire().is_acquired());

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for index in 0..3 {
        let limiter = limiter.clone();
        let shutdown = shutdown.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            limiter.acquire(&shutdown).await.unwrap();
            order.lock().unwrap().push(index);
        }));
        // Let each waiter enqueue before the next one starts.
        tokio::task::yield_now().await;
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_denies_immediately() {
    let limiter = Arc::new(one_per_second(1));
    let shutdown = ShutdownCoordinator::shared();
    assert!(limiter.try_acquire().is_acquired());

    let queued = {
        let limiter = limiter.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { limiter.acquire(&shutdown).await })
    };
    tokio::task::yield_now().await;
    assert_eq!(limiter.queued(), 1);

    let lease = limiter.acquire(&shutdown).await.unwrap();
    assert!(!lease.is_acquired());
    assert_eq!(lease.retry_after(), Some(Duration::from_secs(2)));

    assert_eq!(queued.await.unwrap().unwrap(), Lease::Granted);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_releases_queue_slot() {
    let limiter = Arc::new(one_per_second(1));
    let shutdown = ShutdownCoordinator::shared();
    assert!(limiter.try_acquire().is_acquired());

    let waiter = {
        let limiter = limiter.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { limiter.acquire(&shutdown).await })
    };
    tokio::task::yield_now().await;
    assert_eq!(limiter.queued(), 1);

    shutdown.request_shutdown();
    assert_eq!(waiter.await.unwrap(), Err(Cancelled));
    assert_eq!(limiter.queued(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sender_waits_out_denials() {
    let transport = Arc::new(ScriptedTransport::new(|_| status_response(200, "ok")));
    let limiter = Arc::new(one_per_second(0));
    let sender = Arc::new(ThrottledSender::new(transport.clone(), limiter));
    let shutdown = ShutdownCoordinator::shared();
    let started = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let sender = sender.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            let request = random_mod_collector::api::ApiRequest::new(
                random_mod_collector::api::HttpMethod::Get,
                "https://osu.test/osu/1",
                None,
            );
            sender.execute(request, &shutdown).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().as_ref(), b"ok");
    }

    assert_eq!(transport.requests().len(), 3);
    assert!(started.elapsed() >= Duration::from_secs(2));
}
