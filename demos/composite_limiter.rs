//! Composite limiter example: stack a tight burst guard in front of a
//! looser per-route ceiling and watch the first denial win.
//!
//! Run with:
//! ```
//! cargo run -p edge-gateway --example composite_limiter --features memory
//! ```

use edge_gateway::clock::ManualClock;
use edge_gateway::kv::MemoryKv;
use edge_gateway::{CompositeLimiter, FixedWindow, LimiterEntry, Quota, TokenBucket};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let kv = MemoryKv::new();
    let clock = ManualClock::new(0);

    // A per-second burst guard (priority 10, checked first) sits ahead of a
    // per-route daily ceiling (priority 0, checked last).
    let composite = CompositeLimiter::new()
        .with_entry(LimiterEntry::new(
            "burst_guard",
            10,
            Quota::per_second(3),
            TokenBucket::new(),
        ))
        .with_entry(LimiterEntry::new(
            "route_daily_ceiling",
            0,
            Quota::per_day(10),
            FixedWindow::new(),
        ));

    println!("=== Composite Limiter Demo ===\n");
    println!("burst_guard: 3/s  |  route_daily_ceiling: 10/day\n");

    for i in 1..=5 {
        let result = composite.check_and_record(&kv, &clock, "route:/api/search").await?;
        println!(
            "Request {}: {} (decided by: {})",
            i,
            if result.is_allowed() { "allowed" } else { "denied" },
            result.limiter_name,
        );
    }

    Ok(())
}
