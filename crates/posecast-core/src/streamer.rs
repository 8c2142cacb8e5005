//! The sample, encode, broadcast tick.

use crate::broadcaster::{BroadcastReport, Broadcaster};
use crate::message::{unix_time_secs, Message};
use crate::source::{PoseSource, PoseSourceError};
use crate::ticker::{TickTiming, Ticker, TickerStats};
use posecast_protocol::{PoseEncoder, ProtocolError};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

/// Errors that stop the stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The pose source failed. Stale poses are never sent in its place.
    #[error("Pose source failed: {0}")]
    Source(#[from] PoseSourceError),

    /// The sample could not be encoded.
    #[error("Encoding failed: {0}")]
    Encode(#[from] ProtocolError),
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// Encoded message size in bytes.
    pub bytes: usize,
    /// Fan-out result.
    pub report: BroadcastReport,
}

/// Samples one tracked object and broadcasts it to all sessions.
pub struct PoseStreamer {
    source: Arc<dyn PoseSource>,
    encoder: PoseEncoder,
    tracked_object_id: String,
    broadcaster: Broadcaster,
}

impl PoseStreamer {
    #[must_use]
    pub fn new(
        source: Arc<dyn PoseSource>,
        encoder: PoseEncoder,
        tracked_object_id: impl Into<String>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            source,
            encoder,
            tracked_object_id: tracked_object_id.into(),
            broadcaster,
        }
    }

    /// Run a single tick.
    ///
    /// # Errors
    ///
    /// Returns an error if sampling or encoding fails. Client send failures
    /// are contained in the report.
    pub async fn tick(&self) -> Result<TickOutcome, StreamError> {
        let sample = self.source.sample_pose(&self.tracked_object_id)?;
        let text = self.encoder.encode(&sample, unix_time_secs())?;
        let bytes = text.len();

        let report = self.broadcaster.broadcast(&Message::text(text)).await;
        Ok(TickOutcome { bytes, report })
    }

    /// Tick on `ticker` until cancelled or the source fails.
    ///
    /// `observe` sees every completed tick with the ticker's timing for it.
    /// The pose source is released when the loop ends, whatever the reason.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the loop.
    pub async fn run<F>(
        &self,
        ticker: &Ticker,
        cancel: &CancellationToken,
        observe: F,
    ) -> Result<TickerStats, StreamError>
    where
        F: Fn(&TickOutcome, TickTiming),
    {
        info!(
            source = self.source.name(),
            tracked_object = %self.tracked_object_id,
            format = %self.encoder.format(),
            policy = self.encoder.format().policy_name(),
            interval_ms = ticker.interval().as_secs_f64() * 1000.0,
            "Pose stream starting"
        );

        let result = ticker
            .run(
                || self.tick(),
                |outcome: TickOutcome, timing: TickTiming| {
                    trace!(
                        bytes = outcome.bytes,
                        delivered = outcome.report.delivered,
                        elapsed_us = timing.elapsed.as_micros() as u64,
                        "Tick"
                    );
                    observe(&outcome, timing);
                },
                cancel,
            )
            .await;

        self.source.release();
        match &result {
            Ok(stats) => info!(ticks = stats.ticks, overruns = stats.overruns, "Pose stream stopped"),
            Err(e) => error!(error = %e, "Pose stream failed"),
        }
        result
    }
}
