//! Algorithm comparison example.
//!
//! Run with:
//! ```
//! cargo run -p edge-gateway --example algorithms --features "memory all-algorithms"
//! ```

use edge_gateway::clock::SystemClock;
use edge_gateway::kv::MemoryKv;
use edge_gateway::{Algorithm, FixedWindow, Quota, SlidingWindow, TokenBucket};

#[cfg(feature = "leaky-bucket")]
use edge_gateway::LeakyBucket;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let quota = Quota::per_second(5).with_burst(3);

    println!("=== Algorithm Comparison Demo ===\n");
    println!("Quota: 5 requests/second, burst: 3\n");

    test_algorithm("Token Bucket", TokenBucket::new(), &quota).await?;
    #[cfg(feature = "leaky-bucket")]
    test_algorithm("Leaky Bucket", LeakyBucket::new(), &quota).await?;
    test_algorithm("Sliding Window", SlidingWindow::new(), &quota).await?;
    test_algorithm("Fixed Window", FixedWindow::new(), &quota).await?;

    println!("\n=== Algorithm Characteristics ===\n");
    println!("| Algorithm      | Memory | Burst Handling | Best For                |");
    println!("|----------------|--------|----------------|-------------------------|");
    println!("| Token Bucket   | Low    | Excellent      | Bursty traffic          |");
    println!("| Leaky Bucket   | Low    | Smooth         | Stable backend load     |");
    println!("| Sliding Window | Medium | Good           | Precision critical      |");
    println!("| Fixed Window   | Low    | Poor           | Simple use cases        |");

    Ok(())
}

async fn test_algorithm<A: Algorithm>(
    name: &str,
    algorithm: A,
    quota: &Quota,
) -> Result<(), Box<dyn std::error::Error>> {
    let kv = MemoryKv::new();
    let clock = SystemClock;
    let key = format!("test:{}", name.to_lowercase().replace(' ', "_"));

    print!("{:15} | ", name);

    let mut results = Vec::new();
    for _ in 0..8 {
        let decision = algorithm.check_and_record(&kv, &clock, &key, quota).await?;
        results.push(if decision.is_allowed() { "allow" } else { "deny " });
    }

    println!("{}", results.join(" "));
    Ok(())
}
