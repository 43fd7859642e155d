//! Calculator - bidirectional request/response example.
//!
//! This example demonstrates:
//! - Linking two engines over an in-process transport pair
//! - Registering typed method handlers with the builder pattern
//! - Calling methods in both directions (neither side is "the server")
//! - An application error code crossing the wire unchanged
//!
//! Run with `cargo run --example calculator`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tandem_rpc::{InProcTransport, Rpc, RpcError, WireError};

/// Input structure for the divide method.
#[derive(Serialize, Deserialize, Debug)]
struct DivideInput {
    numerator: f64,
    denominator: f64,
}

/// Output structure for the divide method.
#[derive(Serialize, Deserialize, Debug)]
struct DivideOutput {
    quotient: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = InProcTransport::pair();

    // Math side: answers add and divide.
    let calculator = Rpc::builder(Arc::new(left))
        .method("add", |terms: [i64; 2]| async move {
            Ok::<_, WireError>(terms[0] + terms[1])
        })
        .method("divide", |input: DivideInput| async move {
            if input.denominator == 0.0 {
                return Err(WireError::new(-40001, "division by zero"));
            }
            Ok(DivideOutput {
                quotient: input.numerator / input.denominator,
            })
        })
        .timeout(Duration::from_secs(2))
        .build()?;

    // Clock side: answers now, calls the math side.
    let clock = Rpc::builder(Arc::new(right))
        .method("now", |_: ()| async move {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| WireError::application(e.to_string()))?
                .as_millis() as u64;
            Ok::<_, WireError>(millis)
        })
        .timeout(Duration::from_secs(2))
        .build()?;

    // Both sides announce themselves; connect resolves once a handshake
    // pair completes, whichever endpoint started first.
    tokio::try_join!(
        calculator.connect_with_timeout(Duration::from_secs(1)),
        clock.connect_with_timeout(Duration::from_secs(1)),
    )?;

    // Clock calls the calculator.
    let sum: i64 = clock.call("add", &[2, 3]).await?;
    println!("add(2, 3) = {sum}");

    let division: DivideOutput = clock
        .call(
            "divide",
            &DivideInput {
                numerator: 1.0,
                denominator: 8.0,
            },
        )
        .await?;
    println!("divide(1, 8) = {}", division.quotient);

    // The same link carries calls the other way.
    let millis: u64 = calculator.call("now", &()).await?;
    println!("peer clock reads {millis} ms since the epoch");

    // Division by zero comes back with the handler's own error code.
    let failure: Result<DivideOutput, _> = clock
        .call(
            "divide",
            &DivideInput {
                numerator: 1.0,
                denominator: 0.0,
            },
        )
        .await;
    match failure {
        Err(RpcError::Remote(error)) => {
            eprintln!("divide(1, 0) failed as expected: {error}");
        }
        other => eprintln!("unexpected outcome: {other:?}"),
    }

    Ok(())
}
