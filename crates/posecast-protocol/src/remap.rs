//! Axis remap policies.
//!
//! Each wire format owns one fixed policy describing which source fields it
//! keeps and in which unit angles are reported. The policies are historical
//! and differ between formats; downstream clients depend on each of them, so
//! they are kept as separate named values rather than unified.

use crate::pose::{PoseSample, Vec3, POSE_ARITY};

/// Unit used for rotation fields on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    Degrees,
    Radians,
}

impl AngleUnit {
    /// Convert an angle given in degrees into this unit.
    #[must_use]
    pub fn from_degrees(self, degrees: f64) -> f64 {
        match self {
            AngleUnit::Degrees => degrees,
            AngleUnit::Radians => degrees.to_radians(),
        }
    }
}

/// Field selection for the delimited text formats.
///
/// Kept fields are written in source order with angles left in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLayout {
    name: &'static str,
    keep: [bool; POSE_ARITY],
}

impl TextLayout {
    /// Upright tracker: position plus `rot_z`, dropping `rot_x` and `rot_y`.
    pub const UPRIGHT: TextLayout = TextLayout {
        name: "upright",
        keep: [true, true, true, false, false, true],
    };

    /// Upright tracker reporting yaw as `rot_y`, dropping `rot_x` and `rot_z`.
    pub const UPRIGHT_YAW: TextLayout = TextLayout {
        name: "upright_yaw",
        keep: [true, true, true, false, true, false],
    };

    /// Policy name, used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the field at `index` (source order) is written.
    #[must_use]
    pub fn keeps(&self, index: usize) -> bool {
        self.keep.get(index).copied().unwrap_or(false)
    }

    /// Iterate over the kept fields of a sample, in source order.
    pub fn select(&self, sample: &PoseSample) -> impl Iterator<Item = f64> {
        let keep = self.keep;
        sample
            .to_array()
            .into_iter()
            .zip(keep)
            .filter_map(|(value, kept)| kept.then_some(value))
    }
}

/// Component-wise remap for structured formats.
///
/// Dropped components are reported as zero rather than omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRemap {
    name: &'static str,
    position: [bool; 3],
    rotation: [bool; 3],
    unit: AngleUnit,
}

impl AxisRemap {
    /// Upright tracker: `(x, 0, z)` and yaw only, in radians.
    pub const UPRIGHT_TRACKER: AxisRemap = AxisRemap {
        name: "upright_tracker",
        position: [true, false, true],
        rotation: [false, true, false],
        unit: AngleUnit::Radians,
    };

    /// Policy name, used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Remapped position in meters.
    #[must_use]
    pub fn position(&self, sample: &PoseSample) -> Vec3 {
        mask(sample.position(), self.position, |v| v)
    }

    /// Remapped rotation in this policy's unit.
    #[must_use]
    pub fn rotation(&self, sample: &PoseSample) -> Vec3 {
        let unit = self.unit;
        mask(sample.rotation(), self.rotation, |deg| unit.from_degrees(deg))
    }
}

fn mask(v: Vec3, keep: [bool; 3], convert: impl Fn(f64) -> f64) -> Vec3 {
    let [x, y, z] = v.to_array();
    let pick = |value: f64, kept: bool| if kept { convert(value) } else { 0.0 };
    Vec3::new(pick(x, keep[0]), pick(y, keep[1]), pick(z, keep[2]))
}
