//! Pose samples as delivered by a tracking source.
//!
//! A sample is six floats in source order: `[x, y, z, rot_x, rot_y, rot_z]`,
//! position in meters and rotation as Euler angles in degrees.

use serde::{Deserialize, Serialize};

use crate::codec::ProtocolError;

/// Number of fields in a raw pose sample.
pub const POSE_ARITY: usize = 6;

/// A three-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    #[must_use]
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// One 6-DoF sample for a tracked object.
///
/// Position is in meters, rotation in degrees. Samples are immutable once
/// produced.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseSample {
    position: Vec3,
    rotation: Vec3,
}

impl PoseSample {
    /// Create a sample from position (meters) and rotation (degrees).
    #[must_use]
    pub const fn new(position: Vec3, rotation: Vec3) -> Self {
        Self { position, rotation }
    }

    /// Create a sample from source-ordered fields.
    #[must_use]
    pub const fn from_array(v: [f64; POSE_ARITY]) -> Self {
        Self {
            position: Vec3::new(v[0], v[1], v[2]),
            rotation: Vec3::new(v[3], v[4], v[5]),
        }
    }

    /// Create a sample from a slice of source-ordered fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Arity`] unless the slice holds exactly
    /// [`POSE_ARITY`] values.
    pub fn from_slice(values: &[f64]) -> Result<Self, ProtocolError> {
        let fields: [f64; POSE_ARITY] = values
            .try_into()
            .map_err(|_| ProtocolError::Arity(values.len()))?;
        Ok(Self::from_array(fields))
    }

    /// Position in meters.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Rotation in degrees.
    #[must_use]
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    /// Fields in source order.
    #[must_use]
    pub fn to_array(&self) -> [f64; POSE_ARITY] {
        [
            self.position.x,
            self.position.y,
            self.position.z,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        ]
    }
}

impl From<[f64; POSE_ARITY]> for PoseSample {
    fn from(v: [f64; POSE_ARITY]) -> Self {
        Self::from_array(v)
    }
}

impl TryFrom<&[f64]> for PoseSample {
    type Error = ProtocolError;

    fn try_from(values: &[f64]) -> Result<Self, Self::Error> {
        Self::from_slice(values)
    }
}
