// fusion_core/src/config.rs

//! Initial filter state loaded from a TOML file.
//!
//! ```toml
//! time = 0.0
//!
//! [state]
//! position = [0.0, 0.0, 1.0]
//! attitude = [0.0, 0.0, 0.0, 1.0]   # x, y, z, w
//! scale = 1.0
//!
//! [inputs]
//! linear_accel = [0.0, 0.0, 9.81]
//!
//! [std_dev]
//! position = 0.5
//! attitude = 0.1
//! ```
//!
//! Every key is optional; missing keys take the values of a reset [`State`].

use std::path::Path;

use crate::error::ConfigError;
use crate::layout::StateBlock;
use crate::serde_helpers;
use crate::state::State;
use figment::{
    providers::{Format, Toml},
    Figment,
};
use log::{debug, info};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)] // Fail if the TOML has fields not in our struct
pub struct InitialStateConfig {
    /// Timestamp of the initial state.
    pub time: f64,
    pub state: InitialValues,
    pub inputs: InitialInputs,
    /// Initial standard deviation of each error state block.
    pub std_dev: InitialStdDev,
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InitialValues {
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub position: Vector3<f64>,
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub velocity: Vector3<f64>,
    #[serde(with = "serde_helpers::unit_quat_from_xyzw")]
    pub attitude: UnitQuaternion<f64>,
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub gyro_bias: Vector3<f64>,
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub accel_bias: Vector3<f64>,
    pub scale: f64,
    #[serde(with = "serde_helpers::unit_quat_from_xyzw")]
    pub vision_world_attitude: UnitQuaternion<f64>,
    #[serde(with = "serde_helpers::unit_quat_from_xyzw")]
    pub camera_imu_attitude: UnitQuaternion<f64>,
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub camera_imu_position: Vector3<f64>,
}

impl Default for InitialValues {
    fn default() -> Self {
        let reset = State::new();
        Self {
            position: reset.position,
            velocity: reset.velocity,
            attitude: reset.attitude,
            gyro_bias: reset.gyro_bias,
            accel_bias: reset.accel_bias,
            scale: reset.scale,
            vision_world_attitude: reset.vision_world_attitude,
            camera_imu_attitude: reset.camera_imu_attitude,
            camera_imu_position: reset.camera_imu_position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InitialInputs {
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub angular_velocity: Vector3<f64>,
    #[serde(with = "serde_helpers::vec3_from_array")]
    pub linear_accel: Vector3<f64>,
}

/// Standard deviations in the units of each block (rad for rotations).
/// The initial error covariance is diagonal with the squares of these values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InitialStdDev {
    pub position: f64,
    pub velocity: f64,
    pub attitude: f64,
    pub gyro_bias: f64,
    pub accel_bias: f64,
    pub scale: f64,
    pub vision_world_attitude: f64,
    pub camera_imu_attitude: f64,
    pub camera_imu_position: f64,
}

impl InitialStdDev {
    pub fn of(&self, block: StateBlock) -> f64 {
        match block {
            StateBlock::Position => self.position,
            StateBlock::Velocity => self.velocity,
            StateBlock::Attitude => self.attitude,
            StateBlock::GyroBias => self.gyro_bias,
            StateBlock::AccelBias => self.accel_bias,
            StateBlock::Scale => self.scale,
            StateBlock::VisionWorldAttitude => self.vision_world_attitude,
            StateBlock::CameraImuAttitude => self.camera_imu_attitude,
            StateBlock::CameraImuPosition => self.camera_imu_position,
        }
    }
}

impl InitialStateConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading initial state from: {}", path.display());
        if !path.is_file() {
            return Err(ConfigError::Invalid(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        let config: Self = Figment::new().merge(Toml::file(path)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new().merge(Toml::string(text)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that cannot form a valid state: non-finite numbers,
    /// a non-positive scale, or negative standard deviations. Quaternions are
    /// already checked for finite, non-zero components when deserialized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.time.is_finite() {
            return Err(ConfigError::Invalid("time must be finite".into()));
        }
        let v = &self.state;
        let vectors = [
            v.position,
            v.velocity,
            v.gyro_bias,
            v.accel_bias,
            v.camera_imu_position,
            self.inputs.angular_velocity,
            self.inputs.linear_accel,
        ];
        if vectors.iter().flat_map(|x| x.iter()).any(|e| !e.is_finite()) {
            return Err(ConfigError::Invalid("vector values must be finite".into()));
        }
        // Zero would make the visual scale singular.
        if !(v.scale.is_finite() && v.scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "scale must be positive, got {}",
                v.scale
            )));
        }
        for block in StateBlock::ALL {
            let sigma = self.std_dev.of(block);
            if !(sigma.is_finite() && sigma >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "std_dev.{} must be a non-negative number, got {}",
                    block.name(),
                    sigma
                )));
            }
        }
        Ok(())
    }

    /// Builds the initial filter state.
    pub fn build_state(&self) -> State {
        let v = &self.state;
        let mut state = State::new();
        state.position = v.position;
        state.velocity = v.velocity;
        state.attitude = v.attitude;
        state.gyro_bias = v.gyro_bias;
        state.accel_bias = v.accel_bias;
        state.scale = v.scale;
        state.vision_world_attitude = v.vision_world_attitude;
        state.camera_imu_attitude = v.camera_imu_attitude;
        state.camera_imu_position = v.camera_imu_position;
        state.set_imu_inputs(self.inputs.angular_velocity, self.inputs.linear_accel);
        // The integral starts where the estimate starts.
        state.integrated_attitude = v.attitude;
        state.time = self.time;

        for block in StateBlock::ALL {
            let variance = self.std_dev.of(block).powi(2);
            for i in block.error_range() {
                state.error_covariance[(i, i)] = variance;
            }
        }
        debug!(
            "Built initial state at t = {} (position {:?})",
            state.time,
            state.position.as_slice()
        );
        state
    }
}
