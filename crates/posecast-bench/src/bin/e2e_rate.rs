//! End-to-end delivery rate check for Posecast.
//!
//! Connects N clients to a running stream-mode server and reports the
//! per-client message rate and worst inter-arrival gap.
//!
//! ```bash
//! cargo run --release -p posecast-server &
//! cargo run --release -p posecast-bench --bin e2e_rate -- 64 ws://127.0.0.1:9003/
//! ```

use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const DEFAULT_URL: &str = "ws://127.0.0.1:9003/";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[derive(Default)]
struct ClientStats {
    messages: AtomicU64,
    max_gap_us: AtomicU64,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let url = args.get(2).cloned().unwrap_or_else(|| DEFAULT_URL.to_string());

    println!("Posecast end-to-end rate check");
    println!("  server:  {}", url);
    println!("  clients: {}", num_clients);
    println!("  warmup {}s, measure {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let barrier = Arc::new(Barrier::new(num_clients + 1));
    let stats: Vec<Arc<ClientStats>> = (0..num_clients).map(|_| Arc::default()).collect();

    let mut handles = Vec::new();
    for (client_id, client_stats) in stats.iter().enumerate() {
        let url = url.clone();
        let barrier = Arc::clone(&barrier);
        let client_stats = Arc::clone(client_stats);

        handles.push(tokio::spawn(async move {
            if let Err(e) = run_client(&url, client_stats, barrier).await {
                eprintln!("Client {} error: {}", client_id, e);
            }
        }));
    }

    barrier.wait().await;
    println!("All {} clients connected", num_clients);

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;
    for s in &stats {
        s.messages.store(0, Ordering::SeqCst);
        s.max_gap_us.store(0, Ordering::SeqCst);
    }

    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;
    let elapsed = start.elapsed().as_secs_f64();

    let rates: Vec<f64> = stats
        .iter()
        .map(|s| s.messages.load(Ordering::SeqCst) as f64 / elapsed)
        .collect();
    let min = rates.iter().copied().fold(f64::INFINITY, f64::min);
    let max = rates.iter().copied().fold(0.0, f64::max);
    let mean = rates.iter().sum::<f64>() / rates.len().max(1) as f64;
    let worst_gap_ms = stats
        .iter()
        .map(|s| s.max_gap_us.load(Ordering::SeqCst))
        .max()
        .unwrap_or(0) as f64
        / 1000.0;

    println!();
    println!("Results over {:.2}s", elapsed);
    println!("  per-client rate: mean {:.2} Hz, min {:.2} Hz, max {:.2} Hz", mean, min, max);
    println!("  worst gap:       {:.2} ms", worst_gap_ms);

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    url: &str,
    stats: Arc<ClientStats>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (ws, _) = connect_async(url).await?;
    let (_sender, mut receiver) = ws.split();

    barrier.wait().await;

    let mut last: Option<Instant> = None;
    while let Some(msg) = receiver.next().await {
        match msg? {
            Message::Text(_) | Message::Binary(_) => {
                let now = Instant::now();
                if let Some(prev) = last.replace(now) {
                    let gap = now.duration_since(prev).as_micros() as u64;
                    stats.max_gap_us.fetch_max(gap, Ordering::Relaxed);
                }
                stats.messages.fetch_add(1, Ordering::Relaxed);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}
