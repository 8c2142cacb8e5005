//! Pose encoding for the supported wire formats.
//!
//! - `text`: kept fields as fixed 4-decimal values, each followed by two
//!   spaces, angles in degrees.
//! - `text_yaw`: same framing with the yaw-preserving field selection.
//! - `json`: an [`Envelope`] with the upright tracker remap, angles in radians.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use thiserror::Error;

use crate::envelope::{Channel, Envelope};
use crate::pose::{PoseSample, POSE_ARITY};
use crate::remap::{AxisRemap, TextLayout};

/// Separator written after every text field, including the last one.
pub const TEXT_SEPARATOR: &str = "  ";

/// Decimal places for text fields.
pub const TEXT_PRECISION: usize = 4;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Raw sample does not have exactly six fields.
    #[error("Pose sample must have {POSE_ARITY} fields, got {0}")]
    Arity(usize),

    /// Unknown wire format name.
    #[error("Unknown wire format: {0}")]
    UnknownFormat(String),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Supported wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Text,
    TextYaw,
    Json,
}

impl WireFormat {
    /// All formats, for iteration in tests and benches.
    pub const ALL: [WireFormat; 3] = [WireFormat::Text, WireFormat::TextYaw, WireFormat::Json];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Text => "text",
            WireFormat::TextYaw => "text_yaw",
            WireFormat::Json => "json",
        }
    }

    /// Name of the remap policy this format applies.
    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        match self {
            WireFormat::Text => TextLayout::UPRIGHT.name(),
            WireFormat::TextYaw => TextLayout::UPRIGHT_YAW.name(),
            WireFormat::Json => AxisRemap::UPRIGHT_TRACKER.name(),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(WireFormat::Text),
            "text_yaw" => Ok(WireFormat::TextYaw),
            "json" => Ok(WireFormat::Json),
            other => Err(ProtocolError::UnknownFormat(other.to_string())),
        }
    }
}

/// Encode a sample using a text layout.
#[must_use]
pub fn encode_text(sample: &PoseSample, layout: &TextLayout) -> String {
    let mut out = String::with_capacity(64);
    for value in layout.select(sample) {
        // Writing into a String cannot fail.
        let _ = write!(out, "{:.*}{}", TEXT_PRECISION, value, TEXT_SEPARATOR);
    }
    out
}

/// Build the JSON envelope for a sample.
#[must_use]
pub fn envelope(sample: &PoseSample, channel_id: &str, time: f64, remap: &AxisRemap) -> Envelope {
    Envelope::single(
        time,
        Channel::new(channel_id, remap.position(sample), remap.rotation(sample)),
    )
}

/// Encode a sample as a JSON envelope.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_json(
    sample: &PoseSample,
    channel_id: &str,
    time: f64,
    remap: &AxisRemap,
) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&envelope(sample, channel_id, time, remap))?)
}

/// Encoder bound to one wire format and channel id.
#[derive(Debug, Clone)]
pub struct PoseEncoder {
    format: WireFormat,
    channel_id: String,
}

impl PoseEncoder {
    /// Create a new encoder.
    #[must_use]
    pub fn new(format: WireFormat, channel_id: impl Into<String>) -> Self {
        Self {
            format,
            channel_id: channel_id.into(),
        }
    }

    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Encode a sample. `time` is only used by the JSON format.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, sample: &PoseSample, time: f64) -> Result<String, ProtocolError> {
        match self.format {
            WireFormat::Text => Ok(encode_text(sample, &TextLayout::UPRIGHT)),
            WireFormat::TextYaw => Ok(encode_text(sample, &TextLayout::UPRIGHT_YAW)),
            WireFormat::Json => {
                encode_json(sample, &self.channel_id, time, &AxisRemap::UPRIGHT_TRACKER)
            }
        }
    }

    /// Encode raw source-ordered fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Arity`] if `values` does not hold exactly six
    /// fields.
    pub fn encode_values(&self, values: &[f64], time: f64) -> Result<String, ProtocolError> {
        let sample = PoseSample::from_slice(values)?;
        self.encode(&sample, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: [f64; 6] = [1.2345, 9.8, -3.001, 10.0, 45.0, 270.0];

    fn parse_text(text: &str) -> Vec<f64> {
        text.split(TEXT_SEPARATOR)
            .filter(|field| !field.is_empty())
            .map(|field| field.parse().unwrap())
            .collect()
    }

    #[test]
    fn test_text_reference_output() {
        let encoder = PoseEncoder::new(WireFormat::Text, "tracker_1");
        let text = encoder.encode_values(&INPUT, 0.0).unwrap();
        assert_eq!(text, "1.2345  9.8000  -3.0010  270.0000  ");
        assert!(text.is_ascii());
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_text_yaw_reference_output() {
        let encoder = PoseEncoder::new(WireFormat::TextYaw, "tracker_1");
        let text = encoder.encode_values(&INPUT, 0.0).unwrap();
        assert_eq!(text, "1.2345  9.8000  -3.0010  45.0000  ");
    }

    #[test]
    fn test_text_roundtrip_within_tolerance() {
        let encoder = PoseEncoder::new(WireFormat::Text, "t");
        let inputs = [
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [-0.00004, 123.45678, -9999.99991, 1.0, 2.0, -179.99996],
            [3.14159, -2.71828, 1.41421, 360.0, -360.0, 0.12345],
        ];

        for input in inputs {
            let parsed = parse_text(&encoder.encode_values(&input, 0.0).unwrap());
            let expected = [input[0], input[1], input[2], input[5]];
            assert_eq!(parsed.len(), expected.len());
            for (got, want) in parsed.iter().zip(expected) {
                assert!((got - want).abs() <= 1e-4, "{got} vs {want}");
            }
        }
    }

    #[test]
    fn test_json_reference_output() {
        let encoder = PoseEncoder::new(WireFormat::Json, "178376c5ebe-0ed6977d");
        let json = encoder.encode_values(&INPUT, 1700000000.5).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["time"], 1700000000.5);
        let channel = &value["channels"][0];
        assert_eq!(channel["id"], "178376c5ebe-0ed6977d");
        assert_eq!(channel["pos"]["x"], 1.2345);
        assert_eq!(channel["pos"]["y"], 0.0);
        assert_eq!(channel["pos"]["z"], -3.001);
        assert_eq!(channel["rot"]["x"], 0.0);
        assert_eq!(channel["rot"]["z"], 0.0);
        let yaw = channel["rot"]["y"].as_f64().unwrap();
        assert!((yaw - 0.7854).abs() < 1e-4);
    }

    #[test]
    fn test_json_remap_properties() {
        let encoder = PoseEncoder::new(WireFormat::Json, "t");
        let inputs = [
            [0.5, -1.0, 2.0, 30.0, -90.0, 12.0],
            [-7.0, 3.0, 0.0, -45.0, 359.0, 180.0],
        ];

        for input in inputs {
            let json = encoder.encode_values(&input, 0.0).unwrap();
            let envelope: Envelope = serde_json::from_str(&json).unwrap();
            let channel = &envelope.channels[0];
            assert_eq!(channel.pos.y, 0.0);
            assert_eq!(channel.rot.x, 0.0);
            assert_eq!(channel.rot.z, 0.0);
            assert!((channel.rot.y - input[4].to_radians()).abs() < f64::EPSILON * 8.0);
        }
    }

    #[test]
    fn test_wrong_arity_fails_fast() {
        let encoder = PoseEncoder::new(WireFormat::Json, "t");
        assert!(matches!(
            encoder.encode_values(&[1.0, 2.0], 0.0),
            Err(ProtocolError::Arity(2))
        ));
    }

    #[test]
    fn test_wire_format_names() {
        for format in WireFormat::ALL {
            assert_eq!(format.as_str().parse::<WireFormat>().unwrap(), format);
        }
        assert!("xml".parse::<WireFormat>().is_err());
        assert_eq!(WireFormat::Json.policy_name(), "upright_tracker");
    }
}
