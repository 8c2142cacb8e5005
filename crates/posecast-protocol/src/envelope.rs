//! Structured JSON message types.
//!
//! ```text
//! {"time": 1700000000.25,
//!  "channels": [{"id": "tracker_1",
//!                "pos": {"x": 1.2, "y": 0.0, "z": -3.0},
//!                "rot": {"x": 0.0, "y": 0.785, "z": 0.0}}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::pose::Vec3;

/// One tracked object inside an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Identifier of the tracked object as known to clients.
    pub id: String,
    /// Position in meters.
    pub pos: Vec3,
    /// Rotation in radians.
    pub rot: Vec3,
}

impl Channel {
    #[must_use]
    pub fn new(id: impl Into<String>, pos: Vec3, rot: Vec3) -> Self {
        Self {
            id: id.into(),
            pos,
            rot,
        }
    }
}

/// Top-level JSON wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Seconds since the Unix epoch. For display only.
    pub time: f64,
    /// Reported objects, in order.
    pub channels: Vec<Channel>,
}

impl Envelope {
    /// Create an envelope carrying a single channel.
    #[must_use]
    pub fn single(time: f64, channel: Channel) -> Self {
        Self {
            time,
            channels: vec![channel],
        }
    }

    /// Append a channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }
}
