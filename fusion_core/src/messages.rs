// fusion_core/src/messages.rs

//! Plain message shapes produced from a [`State`](crate::state::State).
//!
//! They carry no header, frame id or timestamp. The owning application fills
//! those in when it adapts these structs to its transport's wire format.

use crate::serde_helpers;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// =========================================================================
// == Geometry Primitives ==
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PointMsg {
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl From<&Vector3<f64>> for PointMsg {
    fn from(v: &Vector3<f64>) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

/// Quaternion in `x, y, z, w` field order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuaternionMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl QuaternionMsg {
    /// Rebuilds the rotation. The message is normalized on the way in, since
    /// wire values are not trusted to be unit length.
    pub fn to_unit_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::new_normalize(Quaternion::new(self.w, self.x, self.y, self.z))
    }
}

impl Default for QuaternionMsg {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

impl From<&UnitQuaternion<f64>> for QuaternionMsg {
    fn from(q: &UnitQuaternion<f64>) -> Self {
        let c = q.coords;
        Self {
            x: c.x,
            y: c.y,
            z: c.z,
            w: c.w,
        }
    }
}

// =========================================================================
// == Output Messages ==
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseMsg {
    pub position: PointMsg,
    pub orientation: QuaternionMsg,
}

/// A pose with its 6x6 covariance, position block first, then the attitude
/// tangent block. The covariance is stored row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: PoseMsg,
    #[serde(with = "serde_helpers::row_major_6x6")]
    pub covariance: [f64; 36],
}

impl Default for PoseWithCovariance {
    fn default() -> Self {
        Self {
            pose: PoseMsg::default(),
            covariance: [0.0; 36],
        }
    }
}

/// The complete filter state for diagnostics: kinematics, biases, scale,
/// calibration, the raw IMU inputs and the uncorrected attitude integral.
///
/// The error covariance and the time are left out: the pose covariance travels
/// in [`PoseWithCovariance`], and the timestamp belongs to the caller's header.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtState {
    pub position: PointMsg,
    pub velocity: PointMsg,
    pub orientation: QuaternionMsg,
    pub gyro_bias: PointMsg,
    pub accel_bias: PointMsg,
    pub scale: f64,
    pub vision_world_attitude: QuaternionMsg,
    pub camera_imu_attitude: QuaternionMsg,
    pub camera_imu_position: PointMsg,
    pub angular_velocity: PointMsg,
    pub linear_acceleration: PointMsg,
    pub integrated_attitude: QuaternionMsg,
}
