//! Offline replay of recorded samples.
//!
//! Each input line is a JSON sample `{"price": "...", "timestamp": ...}`. The
//! sample is recorded into a fresh feed whose clock is moved to the sample's
//! timestamp, and one JSON line with the spot price and TWAP is written out.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use twap_oracle::{EngineConfig, ManualClock, Price, TwapFeed};

#[derive(Debug, Deserialize)]
struct ReplaySample {
    price: Price,
    timestamp: u64,
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayLine {
    pub timestamp: u64,
    pub spot: Price,
    pub twap: Price,
}

/// Replay `input` through an engine built from `engine`, writing one
/// [`ReplayLine`] per sample to `output`. Returns the number of samples.
pub fn replay<R: BufRead, W: Write>(
    engine: &EngineConfig,
    interval: u64,
    input: R,
    mut output: W,
) -> anyhow::Result<usize> {
    let clock = Arc::new(ManualClock::new(0));
    let feed = TwapFeed::new("replay", engine.build_cache()?, Arc::clone(&clock));

    let mut samples = 0;
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let sample: ReplaySample =
            serde_json::from_str(&line).with_context(|| format!("line {line_no}"))?;
        feed.record_observation(sample.price, sample.timestamp)
            .with_context(|| format!("line {line_no}"))?;
        clock.set(sample.timestamp);

        let row = ReplayLine {
            timestamp: sample.timestamp,
            spot: feed.get_price(0)?,
            twap: feed.get_price(interval)?,
        };
        serde_json::to_writer(&mut output, &row)?;
        writeln!(output)?;
        samples += 1;
    }
    output.flush()?;
    Ok(samples)
}
