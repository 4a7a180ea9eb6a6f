// fusion_core/src/layout.rs

//! The fixed index maps of the filter state.
//!
//! Every estimated quantity lives in two vectors:
//! - the **full state**, where rotations are unit quaternions stored `[x, y, z, w]`
//!   (4 slots, matching nalgebra's `coords` ordering), and
//! - the **error state**, where rotations are 3-parameter tangent increments.
//!
//! ```text
//! block                  full      error
//! Position               0 - 2     0 - 2
//! Velocity               3 - 5     3 - 5
//! Attitude               6 - 9     6 - 8
//! GyroBias              10 - 12    9 - 11
//! AccelBias             13 - 15   12 - 14
//! Scale                 16        15
//! VisionWorldAttitude   17 - 20   16 - 18
//! CameraImuAttitude     21 - 24   19 - 21
//! CameraImuPosition     25 - 27   22 - 24
//! ```
//!
//! Propagation, correction and covariance extraction all index through this
//! table; nothing else in the crate hardcodes an offset.

use std::ops::Range;

/// Dimension of the error state, and of the error covariance.
pub const N_STATE: usize = 25;

/// Dimension of the full state vector (one extra slot per quaternion).
pub const N_FULL_STATE: usize = 28;

/// A logical quantity of the filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateBlock {
    Position,
    Velocity,
    Attitude,
    GyroBias,
    AccelBias,
    Scale,
    VisionWorldAttitude,
    CameraImuAttitude,
    CameraImuPosition,
}

impl StateBlock {
    /// All blocks, in layout order.
    pub const ALL: [StateBlock; 9] = [
        StateBlock::Position,
        StateBlock::Velocity,
        StateBlock::Attitude,
        StateBlock::GyroBias,
        StateBlock::AccelBias,
        StateBlock::Scale,
        StateBlock::VisionWorldAttitude,
        StateBlock::CameraImuAttitude,
        StateBlock::CameraImuPosition,
    ];

    /// `true` for the quaternion-valued blocks.
    pub const fn is_rotation(self) -> bool {
        matches!(
            self,
            StateBlock::Attitude | StateBlock::VisionWorldAttitude | StateBlock::CameraImuAttitude
        )
    }

    /// Number of slots this block occupies in the full state.
    pub const fn full_dim(self) -> usize {
        match self {
            StateBlock::Scale => 1,
            _ if self.is_rotation() => 4,
            _ => 3,
        }
    }

    /// Number of slots this block occupies in the error state.
    pub const fn error_dim(self) -> usize {
        match self {
            StateBlock::Scale => 1,
            _ => 3,
        }
    }

    /// First full-state index of this block.
    pub const fn full_offset(self) -> usize {
        match self {
            StateBlock::Position => 0,
            StateBlock::Velocity => 3,
            StateBlock::Attitude => 6,
            StateBlock::GyroBias => 10,
            StateBlock::AccelBias => 13,
            StateBlock::Scale => 16,
            StateBlock::VisionWorldAttitude => 17,
            StateBlock::CameraImuAttitude => 21,
            StateBlock::CameraImuPosition => 25,
        }
    }

    /// First error-state index of this block. Also the row/column of the
    /// block inside the error covariance.
    pub const fn error_offset(self) -> usize {
        match self {
            StateBlock::Position => 0,
            StateBlock::Velocity => 3,
            StateBlock::Attitude => 6,
            StateBlock::GyroBias => 9,
            StateBlock::AccelBias => 12,
            StateBlock::Scale => 15,
            StateBlock::VisionWorldAttitude => 16,
            StateBlock::CameraImuAttitude => 19,
            StateBlock::CameraImuPosition => 22,
        }
    }

    pub fn full_range(self) -> Range<usize> {
        self.full_offset()..self.full_offset() + self.full_dim()
    }

    pub fn error_range(self) -> Range<usize> {
        self.error_offset()..self.error_offset() + self.error_dim()
    }

    /// Human readable name, used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            StateBlock::Position => "position",
            StateBlock::Velocity => "velocity",
            StateBlock::Attitude => "attitude",
            StateBlock::GyroBias => "gyro_bias",
            StateBlock::AccelBias => "accel_bias",
            StateBlock::Scale => "scale",
            StateBlock::VisionWorldAttitude => "vision_world_attitude",
            StateBlock::CameraImuAttitude => "camera_imu_attitude",
            StateBlock::CameraImuPosition => "camera_imu_position",
        }
    }
}

/// Error-state indices of the pose covariance, position first, then attitude.
pub const POSE_ERROR_INDICES: [usize; 6] = [
    StateBlock::Position.error_offset(),
    StateBlock::Position.error_offset() + 1,
    StateBlock::Position.error_offset() + 2,
    StateBlock::Attitude.error_offset(),
    StateBlock::Attitude.error_offset() + 1,
    StateBlock::Attitude.error_offset() + 2,
];
