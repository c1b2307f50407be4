//! End-to-end scenarios for the rate-limiting algorithm family, run against
//! the public crate API with a deterministic clock instead of real sleeps.

use edge_gateway::clock::{Clock, ManualClock};
use edge_gateway::kv::MemoryKv;
use edge_gateway::{Algorithm, FixedWindow, LeakyBucket, Quota, SlidingWindow, TokenBucket};

#[tokio::test]
async fn token_bucket_burst_then_refill() {
    // bucket=10, refill=1/s: first 10 allowed, next 5 denied with retryAfter
    // in 1..=5s, then after a 5s quiescent period the next 5 all succeed.
    let kv = MemoryKv::new();
    let clock = ManualClock::new(0);
    let algorithm = TokenBucket::new();
    let quota = Quota::per_second(1).with_burst(10);

    for i in 1..=10 {
        let decision = algorithm
            .check_and_record(&kv, &clock, "client:a", &quota)
            .await
            .unwrap();
        assert!(decision.is_allowed(), "request {i} should be allowed");
    }

    for _ in 0..5 {
        let decision = algorithm
            .check_and_record(&kv, &clock, "client:a", &quota)
            .await
            .unwrap();
        assert!(decision.is_denied());
        let retry = decision.info().retry_after.unwrap().as_secs();
        assert!((1..=5).contains(&retry), "retryAfter {retry} out of range");
    }

    clock.advance(5_000);

    for i in 1..=5 {
        let decision = algorithm
            .check_and_record(&kv, &clock, "client:a", &quota)
            .await
            .unwrap();
        assert!(decision.is_allowed(), "post-refill request {i} should be allowed");
    }
}

#[tokio::test]
async fn sliding_window_denies_what_fixed_window_admits_at_a_boundary() {
    // limit=5, window=1s. 5 requests at t=900ms, 5 more at t=1100ms.
    // Fixed window buckets [0,1000) and [1000,2000) separately and admits
    // all 10; sliding window sees only 200ms between the two bursts and
    // denies the second batch.
    let limit5_1s = Quota::new(5, std::time::Duration::from_secs(1));

    let fixed_kv = MemoryKv::new();
    let fixed_clock = ManualClock::new(900);
    let fixed = FixedWindow::new();
    for _ in 0..5 {
        let decision = fixed
            .check_and_record(&fixed_kv, &fixed_clock, "client:b", &limit5_1s)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }
    fixed_clock.set(1_100);
    for _ in 0..5 {
        let decision = fixed
            .check_and_record(&fixed_kv, &fixed_clock, "client:b", &limit5_1s)
            .await
            .unwrap();
        assert!(decision.is_allowed(), "fixed window admits the second burst too");
    }

    let sliding_kv = MemoryKv::new();
    let sliding_clock = ManualClock::new(900);
    let sliding = SlidingWindow::new();
    for _ in 0..5 {
        let decision = sliding
            .check_and_record(&sliding_kv, &sliding_clock, "client:b", &limit5_1s)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }
    sliding_clock.set(1_100);
    let denied = sliding
        .check_and_record(&sliding_kv, &sliding_clock, "client:b", &limit5_1s)
        .await
        .unwrap();
    assert!(denied.is_denied(), "sliding window should still see the first burst");
}

#[tokio::test]
async fn leaky_bucket_smooths_bursts_token_bucket_would_admit() {
    // A token bucket of size 3 admits 3 requests instantly; a leaky bucket
    // sized 3 with a slow leak rate only admits one request per tick because
    // each request adds a full unit of water that must drain first.
    let kv = MemoryKv::new();
    let clock = ManualClock::new(0);
    let leaky = LeakyBucket::new();
    let quota = Quota::per_second(1).with_burst(3);

    let first = leaky.check_and_record(&kv, &clock, "client:c", &quota).await.unwrap();
    assert!(first.is_allowed());

    let second = leaky.check_and_record(&kv, &clock, "client:c", &quota).await.unwrap();
    assert!(second.is_allowed(), "leaky bucket still has headroom below bucket_size");

    let third = leaky.check_and_record(&kv, &clock, "client:c", &quota).await.unwrap();
    assert!(third.is_allowed());

    let fourth = leaky.check_and_record(&kv, &clock, "client:c", &quota).await.unwrap();
    assert!(fourth.is_denied(), "water level has reached bucket_size");
}

#[tokio::test]
async fn percentile_ordering_holds_for_concurrent_clients() {
    // Distinct client keys never interfere with each other's state.
    let kv = MemoryKv::new();
    let clock = ManualClock::new(0);
    let algorithm = TokenBucket::new();
    let quota = Quota::per_second(2).with_burst(2);

    for client in ["client:x", "client:y"] {
        for _ in 0..2 {
            let decision = algorithm.check_and_record(&kv, &clock, client, &quota).await.unwrap();
            assert!(decision.is_allowed());
        }
        let decision = algorithm.check_and_record(&kv, &clock, client, &quota).await.unwrap();
        assert!(decision.is_denied(), "{client} should be exhausted independently");
    }
}
