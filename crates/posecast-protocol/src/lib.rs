//! # posecast-protocol
//!
//! Pose samples and wire formats for the Posecast tracker broadcaster.
//!
//! A tracking source yields six floats per sample in the order
//! `[x, y, z, rot_x, rot_y, rot_z]` (meters, degrees). This crate turns a
//! sample into one of the supported wire messages.
//!
//! ## Wire Formats
//!
//! - `text` - `x  y  z  rot_z  `, 4 decimals, degrees
//! - `text_yaw` - `x  y  z  rot_y  `, 4 decimals, degrees
//! - `json` - `{"time", "channels": [{"id", "pos", "rot"}]}`, vertical
//!   position and non-yaw rotation zeroed, radians
//!
//! ## Example
//!
//! ```rust
//! use posecast_protocol::{PoseEncoder, WireFormat};
//!
//! let encoder = PoseEncoder::new(WireFormat::Text, "tracker_1");
//! let text = encoder
//!     .encode_values(&[1.2345, 9.8, -3.001, 10.0, 45.0, 270.0], 0.0)
//!     .unwrap();
//! assert_eq!(text, "1.2345  9.8000  -3.0010  270.0000  ");
//! ```

pub mod codec;
pub mod envelope;
pub mod pose;
pub mod remap;

pub use codec::{PoseEncoder, ProtocolError, WireFormat};
pub use envelope::{Channel, Envelope};
pub use pose::{PoseSample, Vec3, POSE_ARITY};
pub use remap::{AngleUnit, AxisRemap, TextLayout};
