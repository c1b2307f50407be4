//! Basic Token Bucket rate limiting example.
//!
//! Run with:
//! ```
//! cargo run --example token_bucket --features memory
//! ```

use edge_gateway::clock::SystemClock;
use edge_gateway::kv::MemoryKv;
use edge_gateway::{Algorithm, Quota, TokenBucket};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let kv = MemoryKv::new();
    let clock = SystemClock;
    let algorithm = TokenBucket::new();

    // 10 requests per second with burst of 5.
    let quota = Quota::per_second(10).with_burst(5);

    println!("=== Basic Token Bucket Rate Limiting Demo ===\n");
    println!("Quota: 10 requests/second, burst: 5\n");

    for i in 1..=15 {
        let decision = algorithm
            .check_and_record(&kv, &clock, "user:123", &quota)
            .await?;

        if decision.is_allowed() {
            println!("Request {}: allowed (remaining: {})", i, decision.info().remaining);
        } else {
            println!(
                "Request {}: denied (retry after: {:?})",
                i,
                decision.info().retry_after
            );
        }
    }

    println!("\n--- Waiting 1 second for refill ---\n");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let decision = algorithm
        .check_and_record(&kv, &clock, "user:123", &quota)
        .await?;

    println!(
        "After refill: {} (remaining: {})",
        if decision.is_allowed() { "allowed" } else { "denied" },
        decision.info().remaining
    );

    println!("\n--- Rate Limit Headers ---");
    for (name, value) in decision.info().to_headers() {
        println!("{}: {}", name, value);
    }

    Ok(())
}
