//! Notify - fire-and-forget notification example.
//!
//! This example demonstrates:
//! - Sending notifications with `notify` (no correlation ID, no response)
//! - A handler running for its side effect only
//! - Mixing notifications and regular calls on one link
//!
//! Run with `cargo run --example notify`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_rpc::{InProcTransport, Rpc, WireError};

/// Progress update sent by the reporter.
#[derive(Serialize, Deserialize, Debug)]
struct Progress {
    step: u32,
    total: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = InProcTransport::pair();

    // Receiving side: counts progress updates as they arrive and answers
    // stats queries about them.
    let received = Arc::new(AtomicUsize::new(0));
    let progress_counter = Arc::clone(&received);
    let stats_counter = Arc::clone(&received);
    let monitor = Rpc::builder(Arc::new(left))
        .method("progress", move |update: Progress| {
            let counter = Arc::clone(&progress_counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                println!("progress: step {} of {}", update.step, update.total);
                Ok::<_, WireError>(())
            }
        })
        .method("stats", move |_: ()| {
            let counter = Arc::clone(&stats_counter);
            async move { Ok::<_, WireError>(counter.load(Ordering::SeqCst)) }
        })
        .build()?;

    // Reporting side registers nothing; it only sends.
    let reporter = Rpc::builder(Arc::new(right))
        .timeout(Duration::from_secs(2))
        .build()?;

    tokio::try_join!(monitor.connect(), reporter.connect())?;

    // Each notification resolves as soon as the envelope is on the wire;
    // no response ever comes back and nothing is left pending.
    let total = 5;
    for step in 1..=total {
        reporter.notify("progress", &Progress { step, total }).await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(reporter.pending_calls(), 0);

    // A regular call on the same link confirms the updates landed.
    let seen: usize = reporter.call("stats", &()).await?;
    println!("monitor counted {seen} update(s)");

    Ok(())
}
