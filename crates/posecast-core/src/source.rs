//! Pose sources.
//!
//! A [`PoseSource`] wraps a tracking driver and answers "latest sample for
//! this tracked object". Sampling is synchronous and expected to be fast
//! relative to the tick interval.

use posecast_protocol::{PoseSample, Vec3};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

/// Pose source errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoseSourceError {
    /// The tracked object is not known to the driver.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The driver cannot deliver samples.
    #[error("Driver unavailable: {0}")]
    DriverUnavailable(String),

    /// The driver does not implement the request.
    #[error("Not supported")]
    NotSupported,
}

/// Size of the tracked play area in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayArea {
    pub width: f64,
    pub height: f64,
}

/// A source of pose samples.
pub trait PoseSource: Send + Sync {
    /// Latest sample for `tracked_object_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PoseSourceError::DeviceNotFound`] for unknown objects and
    /// [`PoseSourceError::DriverUnavailable`] when the driver is gone.
    fn sample_pose(&self, tracked_object_id: &str) -> Result<PoseSample, PoseSourceError>;

    /// Extent of the play area. Informational only.
    ///
    /// # Errors
    ///
    /// Returns [`PoseSourceError::NotSupported`] unless the driver reports it.
    fn play_area_extent(&self) -> Result<PlayArea, PoseSourceError> {
        Err(PoseSourceError::NotSupported)
    }

    /// Release the driver handle. Later samples fail.
    fn release(&self) {}

    /// Source name (e.g., "simulated", "static").
    fn name(&self) -> &'static str;
}

/// Reports the same pose on every sample.
#[derive(Debug)]
pub struct StaticPoseSource {
    tracked_object_id: String,
    sample: PoseSample,
    released: AtomicBool,
}

impl StaticPoseSource {
    #[must_use]
    pub fn new(tracked_object_id: impl Into<String>, sample: PoseSample) -> Self {
        Self {
            tracked_object_id: tracked_object_id.into(),
            sample,
            released: AtomicBool::new(false),
        }
    }
}

impl PoseSource for StaticPoseSource {
    fn sample_pose(&self, tracked_object_id: &str) -> Result<PoseSample, PoseSourceError> {
        if self.released.load(Ordering::Acquire) {
            return Err(PoseSourceError::DriverUnavailable("source released".into()));
        }
        if tracked_object_id != self.tracked_object_id {
            return Err(PoseSourceError::DeviceNotFound(tracked_object_id.to_string()));
        }
        Ok(self.sample)
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Simulated tracker walking a circle around the play area centre.
///
/// The tracker is held upright at a fixed height and faces along its path,
/// so yaw (`rot_y`) turns once per lap while pitch and roll stay zero.
#[derive(Debug)]
pub struct SimulatedPoseSource {
    tracked_object_id: String,
    radius: f64,
    period: Duration,
    height: f64,
    started: Instant,
    released: AtomicBool,
}

impl SimulatedPoseSource {
    /// Default tracker height in meters.
    pub const DEFAULT_HEIGHT: f64 = 1.0;

    /// Create a simulated source. `period` is the time for one lap.
    #[must_use]
    pub fn new(tracked_object_id: impl Into<String>, radius: f64, period: Duration) -> Self {
        info!(radius, period_s = period.as_secs_f64(), "Simulated pose source started");
        Self {
            tracked_object_id: tracked_object_id.into(),
            radius,
            period,
            height: Self::DEFAULT_HEIGHT,
            started: Instant::now(),
            released: AtomicBool::new(false),
        }
    }

    /// Pose after `elapsed` time on the path.
    #[must_use]
    pub fn pose_at(&self, elapsed: Duration) -> PoseSample {
        let period = self.period.as_secs_f64();
        let phase = if period > 0.0 {
            (elapsed.as_secs_f64() / period).fract()
        } else {
            0.0
        };
        let angle = phase * TAU;
        let position = Vec3::new(
            self.radius * angle.cos(),
            self.height,
            self.radius * angle.sin(),
        );
        // Tangent heading, kept in [0, 360).
        let yaw = (90.0 - angle.to_degrees()).rem_euclid(360.0);
        PoseSample::new(position, Vec3::new(0.0, yaw, 0.0))
    }
}

impl PoseSource for SimulatedPoseSource {
    fn sample_pose(&self, tracked_object_id: &str) -> Result<PoseSample, PoseSourceError> {
        if self.released.load(Ordering::Acquire) {
            return Err(PoseSourceError::DriverUnavailable("source released".into()));
        }
        if tracked_object_id != self.tracked_object_id {
            return Err(PoseSourceError::DeviceNotFound(tracked_object_id.to_string()));
        }
        Ok(self.pose_at(self.started.elapsed()))
    }

    fn play_area_extent(&self) -> Result<PlayArea, PoseSourceError> {
        let side = self.radius * 2.0;
        Ok(PlayArea {
            width: side,
            height: side,
        })
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            info!("Simulated pose source released");
        }
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
