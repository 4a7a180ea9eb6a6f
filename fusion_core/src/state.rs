// fusion_core/src/state.rs

use std::cmp::Ordering;

use crate::error::StateError;
use crate::layout::{StateBlock, N_FULL_STATE, N_STATE, POSE_ERROR_INDICES};
use crate::messages::{ExtState, PoseMsg, PoseWithCovariance};
use log::{trace, warn};
use nalgebra::{
    Const, Dyn, Matrix6, MatrixView, Quaternion, SMatrix, SVector, UnitQuaternion, Vector3, U1,
};

// --- Core Type Aliases ---
pub type ErrorCovariance = SMatrix<f64, N_STATE, N_STATE>;
pub type ErrorStateVector = SVector<f64, N_STATE>;
pub type FullStateVector = SVector<f64, N_FULL_STATE>;
/// A block of the error covariance, viewed in place.
pub type CovarianceBlock<'a> = MatrixView<'a, f64, Dyn, Dyn, U1, Const<N_STATE>>;

/// The state of the error-state filter, its error covariance and the latest
/// system inputs, all referring to the instant `time`.
///
/// The position of each estimated quantity in the full state vector and in the
/// error state vector is fixed by [`StateBlock`]; see [`crate::layout`].
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    // --- States varying during propagation ---
    /// Position, IMU centered.
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub attitude: UnitQuaternion<f64>,
    pub gyro_bias: Vector3<f64>,
    pub accel_bias: Vector3<f64>,

    // --- States not varying during propagation ---
    /// Visual scale. Multiplicative, so its neutral value is 1.
    pub scale: f64,
    /// Drift between the vision frame and the world frame.
    pub vision_world_attitude: UnitQuaternion<f64>,
    pub camera_imu_attitude: UnitQuaternion<f64>,
    pub camera_imu_position: Vector3<f64>,

    // --- System inputs ---
    /// Latest raw gyroscope reading.
    pub angular_velocity_input: Vector3<f64>,
    /// Latest raw accelerometer reading.
    pub linear_accel_input: Vector3<f64>,

    /// Integrated angular velocity with no corrections applied. Written by the
    /// propagation step and only ever read back for diagnostics.
    pub integrated_attitude: UnitQuaternion<f64>,

    /// Covariance of the minimal error state.
    pub error_covariance: ErrorCovariance,

    /// Time of this estimate.
    pub time: f64,
}

/// Borrowed view of one block of the state.
enum BlockRef<'a> {
    Vector(&'a Vector3<f64>),
    Rotation(&'a UnitQuaternion<f64>),
    Scalar(f64),
}

enum BlockMut<'a> {
    Vector(&'a mut Vector3<f64>),
    Rotation(&'a mut UnitQuaternion<f64>),
    Scalar(&'a mut f64),
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Creates a state in its reset configuration.
    pub fn new() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            attitude: UnitQuaternion::identity(),
            gyro_bias: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            scale: 1.0,
            vision_world_attitude: UnitQuaternion::identity(),
            camera_imu_attitude: UnitQuaternion::identity(),
            camera_imu_position: Vector3::zeros(),
            angular_velocity_input: Vector3::zeros(),
            linear_accel_input: Vector3::zeros(),
            integrated_attitude: UnitQuaternion::identity(),
            error_covariance: ErrorCovariance::zeros(),
            time: 0.0,
        }
    }

    /// Resets the state.
    ///
    /// 3D vectors: 0; quaternions: identity; scale: 1; time: 0; error covariance: zeros.
    pub fn reset(&mut self) {
        trace!("Resetting filter state (previous time {})", self.time);
        *self = Self::new();
    }

    fn block(&self, block: StateBlock) -> BlockRef<'_> {
        match block {
            StateBlock::Position => BlockRef::Vector(&self.position),
            StateBlock::Velocity => BlockRef::Vector(&self.velocity),
            StateBlock::Attitude => BlockRef::Rotation(&self.attitude),
            StateBlock::GyroBias => BlockRef::Vector(&self.gyro_bias),
            StateBlock::AccelBias => BlockRef::Vector(&self.accel_bias),
            StateBlock::Scale => BlockRef::Scalar(self.scale),
            StateBlock::VisionWorldAttitude => BlockRef::Rotation(&self.vision_world_attitude),
            StateBlock::CameraImuAttitude => BlockRef::Rotation(&self.camera_imu_attitude),
            StateBlock::CameraImuPosition => BlockRef::Vector(&self.camera_imu_position),
        }
    }

    fn block_mut(&mut self, block: StateBlock) -> BlockMut<'_> {
        match block {
            StateBlock::Position => BlockMut::Vector(&mut self.position),
            StateBlock::Velocity => BlockMut::Vector(&mut self.velocity),
            StateBlock::Attitude => BlockMut::Rotation(&mut self.attitude),
            StateBlock::GyroBias => BlockMut::Vector(&mut self.gyro_bias),
            StateBlock::AccelBias => BlockMut::Vector(&mut self.accel_bias),
            StateBlock::Scale => BlockMut::Scalar(&mut self.scale),
            StateBlock::VisionWorldAttitude => BlockMut::Rotation(&mut self.vision_world_attitude),
            StateBlock::CameraImuAttitude => BlockMut::Rotation(&mut self.camera_imu_attitude),
            StateBlock::CameraImuPosition => BlockMut::Vector(&mut self.camera_imu_position),
        }
    }

    // =========================================================================
    // == Covariance Extraction ==
    // =========================================================================

    /// The 6x6 covariance of position and attitude: the position block first,
    /// then the attitude tangent block, cross terms included.
    ///
    /// This is a plain row/column selection out of `error_covariance`.
    pub fn pose_covariance(&self) -> Matrix6<f64> {
        Matrix6::from_fn(|r, c| {
            self.error_covariance[(POSE_ERROR_INDICES[r], POSE_ERROR_INDICES[c])]
        })
    }

    /// Writes the covariance corresponding to position and attitude to `cov`,
    /// row-major.
    pub fn write_pose_covariance(&self, cov: &mut [f64; 36]) {
        for (r, &row) in POSE_ERROR_INDICES.iter().enumerate() {
            for (c, &col) in POSE_ERROR_INDICES.iter().enumerate() {
                cov[r * 6 + c] = self.error_covariance[(row, col)];
            }
        }
    }

    /// Cross-covariance between two blocks of the error state, borrowed from
    /// `error_covariance`.
    pub fn covariance_block(&self, rows: StateBlock, cols: StateBlock) -> CovarianceBlock<'_> {
        self.error_covariance.view(
            (rows.error_offset(), cols.error_offset()),
            (rows.error_dim(), cols.error_dim()),
        )
    }

    // =========================================================================
    // == Message Assembly ==
    // =========================================================================

    /// Assembles a pose-with-covariance message. No header is set.
    pub fn pose_msg(&self) -> PoseWithCovariance {
        let mut msg = PoseWithCovariance {
            pose: PoseMsg {
                position: (&self.position).into(),
                orientation: (&self.attitude).into(),
            },
            ..Default::default()
        };
        self.write_pose_covariance(&mut msg.covariance);
        msg
    }

    /// Assembles the full diagnostic state message. No header is set.
    pub fn state_msg(&self) -> ExtState {
        ExtState {
            position: (&self.position).into(),
            velocity: (&self.velocity).into(),
            orientation: (&self.attitude).into(),
            gyro_bias: (&self.gyro_bias).into(),
            accel_bias: (&self.accel_bias).into(),
            scale: self.scale,
            vision_world_attitude: (&self.vision_world_attitude).into(),
            camera_imu_attitude: (&self.camera_imu_attitude).into(),
            camera_imu_position: (&self.camera_imu_position).into(),
            angular_velocity: (&self.angular_velocity_input).into(),
            linear_acceleration: (&self.linear_accel_input).into(),
            integrated_attitude: (&self.integrated_attitude).into(),
        }
    }

    // =========================================================================
    // == Full State <-> Error State ==
    // =========================================================================

    /// Packs the estimated quantities into the full state layout.
    /// Quaternions are written `[x, y, z, w]`.
    pub fn to_full_vector(&self) -> FullStateVector {
        let mut x = FullStateVector::zeros();
        for block in StateBlock::ALL {
            let offset = block.full_offset();
            match self.block(block) {
                BlockRef::Vector(v) => x.fixed_rows_mut::<3>(offset).copy_from(v),
                BlockRef::Rotation(q) => x.fixed_rows_mut::<4>(offset).copy_from(&q.coords),
                BlockRef::Scalar(s) => x[offset] = s,
            }
        }
        x
    }

    /// Unpacks a full state vector. Each quaternion is normalized on the way in,
    /// so it must not be zero. Inputs, covariance and time are left untouched.
    pub fn set_full_vector(&mut self, x: &FullStateVector) {
        for block in StateBlock::ALL {
            let offset = block.full_offset();
            match self.block_mut(block) {
                BlockMut::Vector(v) => v.copy_from(&x.fixed_rows::<3>(offset)),
                BlockMut::Rotation(q) => {
                    let c = x.fixed_rows::<4>(offset);
                    let raw = Quaternion::new(c[3], c[0], c[1], c[2]);
                    debug_assert!(raw.norm() > 0.0, "zero quaternion in {:?}", block);
                    *q = UnitQuaternion::new_normalize(raw);
                }
                BlockMut::Scalar(s) => *s = x[offset],
            }
        }
    }

    /// Applies an error state correction onto the full state.
    ///
    /// Translational and scalar blocks are added. Rotations are composed on the
    /// right with the exponential of their tangent increment, `q <- q * exp(dtheta)`,
    /// and renormalized.
    pub fn boxplus(&mut self, delta: &ErrorStateVector) {
        for block in StateBlock::ALL {
            let offset = block.error_offset();
            match self.block_mut(block) {
                BlockMut::Vector(v) => *v += delta.fixed_rows::<3>(offset),
                BlockMut::Rotation(q) => {
                    let tangent = delta.fixed_rows::<3>(offset).into_owned();
                    *q *= UnitQuaternion::from_scaled_axis(tangent);
                    q.renormalize();
                }
                BlockMut::Scalar(s) => *s += delta[offset],
            }
        }
    }

    /// The error state taking `reference` to `self`, i.e. the inverse of
    /// [`State::boxplus`]: `reference.boxplus(&self.boxminus(reference)) == self`
    /// for rotation differences below pi.
    pub fn boxminus(&self, reference: &State) -> ErrorStateVector {
        let mut delta = ErrorStateVector::zeros();
        for block in StateBlock::ALL {
            let offset = block.error_offset();
            match (self.block(block), reference.block(block)) {
                (BlockRef::Vector(a), BlockRef::Vector(b)) => {
                    delta.fixed_rows_mut::<3>(offset).copy_from(&(a - b))
                }
                (BlockRef::Rotation(a), BlockRef::Rotation(b)) => delta
                    .fixed_rows_mut::<3>(offset)
                    .copy_from(&(b.inverse() * a).scaled_axis()),
                (BlockRef::Scalar(a), BlockRef::Scalar(b)) => delta[offset] = a - b,
                _ => unreachable!("block kinds are fixed by the layout"),
            }
        }
        delta
    }

    // =========================================================================
    // == Invariant Maintenance ==
    // =========================================================================

    /// Re-normalizes every quaternion to unit length.
    pub fn normalize_quaternions(&mut self) {
        self.attitude.renormalize();
        self.vision_world_attitude.renormalize();
        self.camera_imu_attitude.renormalize();
        self.integrated_attitude.renormalize();
    }

    /// Replaces the error covariance with `(P + P^T) / 2`.
    pub fn symmetrize_covariance(&mut self) {
        self.error_covariance = (self.error_covariance + self.error_covariance.transpose()) * 0.5;
    }

    fn quaternions(&self) -> [(&'static str, &UnitQuaternion<f64>); 4] {
        [
            (StateBlock::Attitude.name(), &self.attitude),
            (StateBlock::VisionWorldAttitude.name(), &self.vision_world_attitude),
            (StateBlock::CameraImuAttitude.name(), &self.camera_imu_attitude),
            ("integrated_attitude", &self.integrated_attitude),
        ]
    }

    /// Diagnostic check of the state invariants. Too expensive for every step;
    /// meant for periodic checks by the owning estimator.
    ///
    /// Reports the first violation found: a non-finite value, a quaternion whose
    /// norm is off by more than `tolerance`, an asymmetric covariance, or a
    /// covariance that is not positive semi-definite.
    pub fn check_invariants(&self, tolerance: f64) -> Result<(), StateError> {
        let result = self.find_violation(tolerance);
        if let Err(err) = &result {
            warn!("State invariant violated at t = {}: {}", self.time, err);
        }
        result
    }

    fn find_violation(&self, tolerance: f64) -> Result<(), StateError> {
        for block in StateBlock::ALL {
            let finite = match self.block(block) {
                BlockRef::Vector(v) => v.iter().all(|e| e.is_finite()),
                BlockRef::Rotation(q) => q.coords.iter().all(|e| e.is_finite()),
                BlockRef::Scalar(s) => s.is_finite(),
            };
            if !finite {
                return Err(StateError::NonFinite {
                    field: block.name(),
                });
            }
        }
        let others = [
            ("angular_velocity_input", self.angular_velocity_input.iter().all(|e| e.is_finite())),
            ("linear_accel_input", self.linear_accel_input.iter().all(|e| e.is_finite())),
            ("integrated_attitude", self.integrated_attitude.coords.iter().all(|e| e.is_finite())),
            ("error_covariance", self.error_covariance.iter().all(|e| e.is_finite())),
            ("time", self.time.is_finite()),
        ];
        if let Some(&(field, _)) = others.iter().find(|(_, finite)| !finite) {
            return Err(StateError::NonFinite { field });
        }

        for (field, q) in self.quaternions() {
            let norm = q.coords.norm();
            if (norm - 1.0).abs() > tolerance {
                return Err(StateError::NonUnitQuaternion { field, norm });
            }
        }

        let max_asymmetry = (self.error_covariance - self.error_covariance.transpose()).amax();
        if max_asymmetry > tolerance {
            return Err(StateError::AsymmetricCovariance { max_asymmetry });
        }

        // Cholesky needs strict definiteness. The shift admits singular PSD
        // matrices and stays positive for a zero tolerance.
        let shift = tolerance.max(0.0)
            + N_STATE as f64 * f64::EPSILON * self.error_covariance.amax().max(1.0);
        let shifted = self.error_covariance + ErrorCovariance::identity() * shift;
        if shifted.cholesky().is_none() {
            return Err(StateError::CovarianceNotPositiveSemiDefinite);
        }

        Ok(())
    }

    // =========================================================================
    // == Time and Inputs ==
    // =========================================================================

    /// Moves the state to `time` and returns the elapsed step.
    ///
    /// A timestamp that does not strictly increase (including NaN) is rejected
    /// and the state is left unchanged.
    pub fn advance_time(&mut self, time: f64) -> Result<f64, StateError> {
        if time.partial_cmp(&self.time) != Some(Ordering::Greater) {
            warn!(
                "Rejected non-monotonic timestamp {} (state is at {})",
                time, self.time
            );
            return Err(StateError::NonMonotonicTime {
                current: self.time,
                requested: time,
            });
        }
        let dt = time - self.time;
        self.time = time;
        Ok(dt)
    }

    /// Stores the latest raw IMU readings.
    pub fn set_imu_inputs(&mut self, angular_velocity: Vector3<f64>, linear_accel: Vector3<f64>) {
        self.angular_velocity_input = angular_velocity;
        self.linear_accel_input = linear_accel;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::messages::QuaternionMsg;

    const EPSILON: f64 = 1e-12;

    /// A state with distinct, non-default values everywhere.
    fn populated_state() -> State {
        let mut state = State::new();
        state.position = Vector3::new(1.0, 2.0, 3.0);
        state.velocity = Vector3::new(-0.5, 0.25, 0.125);
        state.attitude = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3);
        state.gyro_bias = Vector3::new(0.01, 0.02, 0.03);
        state.accel_bias = Vector3::new(-0.1, -0.2, -0.3);
        state.scale = 1.7;
        state.vision_world_attitude = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.4);
        state.camera_imu_attitude = UnitQuaternion::from_euler_angles(-0.3, 0.2, 0.1);
        state.camera_imu_position = Vector3::new(0.05, -0.02, 0.1);
        state.angular_velocity_input = Vector3::new(0.3, 0.2, 0.1);
        state.linear_accel_input = Vector3::new(0.0, 0.1, 9.81);
        state.integrated_attitude = UnitQuaternion::from_euler_angles(0.2, 0.1, 0.0);
        state.error_covariance = ErrorCovariance::from_fn(|i, j| (i * 100 + j) as f64);
        state.time = 12.5;
        state
    }

    fn spd_covariance() -> ErrorCovariance {
        let a = ErrorCovariance::from_fn(|i, j| ((i * 7 + j * 3) % 11) as f64 * 0.01);
        a * a.transpose() + ErrorCovariance::identity() * 0.1
    }

    #[test]
    fn test_reset_postconditions() {
        let mut state = populated_state();
        state.reset();

        for v in [
            &state.position,
            &state.velocity,
            &state.gyro_bias,
            &state.accel_bias,
            &state.camera_imu_position,
            &state.angular_velocity_input,
            &state.linear_accel_input,
        ] {
            assert_eq!(*v, Vector3::zeros());
        }
        for (_, q) in state.quaternions() {
            assert_eq!(*q, UnitQuaternion::identity());
            assert_eq!(q.coords.norm(), 1.0);
        }
        assert_eq!(state.scale, 1.0);
        assert_eq!(state.time, 0.0);
        assert_eq!(state.error_covariance, ErrorCovariance::zeros());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut once = populated_state();
        once.reset();
        let mut twice = once.clone();
        twice.reset();
        assert_eq!(once, twice);
        assert_eq!(once, State::default());
    }

    #[test]
    fn test_pose_covariance_selects_position_and_attitude_blocks() {
        let state = populated_state();
        let cov = state.pose_covariance();
        let expected_indices = [0, 1, 2, 6, 7, 8];
        for r in 0..6 {
            for c in 0..6 {
                let expected = (expected_indices[r] * 100 + expected_indices[c]) as f64;
                assert_eq!(cov[(r, c)], expected, "entry ({}, {})", r, c);
            }
        }
    }

    #[test]
    fn test_write_pose_covariance_is_row_major() {
        let state = populated_state();
        let mut buffer = [f64::NAN; 36];
        state.write_pose_covariance(&mut buffer);
        let cov = state.pose_covariance();
        for r in 0..6 {
            for c in 0..6 {
                assert_eq!(buffer[r * 6 + c], cov[(r, c)]);
            }
        }
        // Position/attitude cross term: row 1 (p_y), column 3 (theta_x).
        assert_eq!(buffer[6 + 3], 106.0);
        assert_eq!(buffer[3 * 6 + 1], 601.0);
    }

    #[test]
    fn test_covariance_block_uses_error_offsets() {
        let state = populated_state();
        let block = state.covariance_block(StateBlock::Scale, StateBlock::CameraImuAttitude);
        assert_eq!(block.shape(), (1, 3));
        assert_eq!(block[(0, 0)], 1519.0);
        assert_eq!(block[(0, 2)], 1521.0);
    }

    #[test]
    fn test_pose_msg_carries_position_and_attitude() {
        let state = populated_state();
        let msg = state.pose_msg();
        assert_eq!(msg.pose.position.to_vector(), state.position);
        let q = msg.pose.orientation;
        assert_eq!(
            [q.x, q.y, q.z, q.w],
            [
                state.attitude.i,
                state.attitude.j,
                state.attitude.k,
                state.attitude.w
            ]
        );
        let mut expected = [0.0; 36];
        state.write_pose_covariance(&mut expected);
        assert_eq!(msg.covariance, expected);
    }

    #[test]
    fn test_state_msg_carries_estimates_inputs_and_integral() {
        let state = populated_state();
        let msg = state.state_msg();
        assert_eq!(msg.position.to_vector(), state.position);
        assert_eq!(msg.velocity.to_vector(), state.velocity);
        assert_eq!(msg.orientation, QuaternionMsg::from(&state.attitude));
        assert_eq!(msg.gyro_bias.to_vector(), state.gyro_bias);
        assert_eq!(msg.accel_bias.to_vector(), state.accel_bias);
        assert_eq!(msg.scale, state.scale);
        assert_eq!(msg.vision_world_attitude, QuaternionMsg::from(&state.vision_world_attitude));
        assert_eq!(msg.camera_imu_attitude, QuaternionMsg::from(&state.camera_imu_attitude));
        assert_eq!(msg.camera_imu_position.to_vector(), state.camera_imu_position);
        assert_eq!(msg.angular_velocity.to_vector(), state.angular_velocity_input);
        assert_eq!(msg.linear_acceleration.to_vector(), state.linear_accel_input);
        assert_eq!(msg.integrated_attitude, QuaternionMsg::from(&state.integrated_attitude));
    }

    #[test]
    fn test_message_assembly_does_not_mutate() {
        let state = populated_state();
        let before = state.clone();
        let _ = state.pose_msg();
        let _ = state.state_msg();
        assert_eq!(state, before);
    }

    #[test]
    fn test_small_rotation_update_keeps_unit_norm() {
        let mut state = populated_state();
        let mut delta = ErrorStateVector::zeros();
        delta
            .fixed_rows_mut::<3>(StateBlock::Attitude.error_offset())
            .copy_from(&Vector3::new(1e-3, -2e-3, 5e-4));
        for _ in 0..1000 {
            state.boxplus(&delta);
        }
        state.normalize_quaternions();
        assert!((state.attitude.coords.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_boxplus_then_boxminus_recovers_correction() {
        let reference = populated_state();
        let delta = ErrorStateVector::from_fn(|i, _| {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            sign * 0.01 * (i as f64 + 1.0)
        });

        let mut corrected = reference.clone();
        corrected.boxplus(&delta);
        let recovered = corrected.boxminus(&reference);

        assert_relative_eq!(recovered, delta, epsilon = 1e-9);
        assert_eq!(corrected.time, reference.time);
        assert_eq!(corrected.error_covariance, reference.error_covariance);
    }

    #[test]
    fn test_boxplus_only_touches_its_block() {
        let reference = populated_state();
        let mut delta = ErrorStateVector::zeros();
        delta[StateBlock::Scale.error_offset()] = 0.3;

        let mut corrected = reference.clone();
        corrected.boxplus(&delta);

        assert_relative_eq!(corrected.scale, 2.0, epsilon = EPSILON);
        assert_eq!(corrected.position, reference.position);
        assert_relative_eq!(
            corrected.attitude.coords,
            reference.attitude.coords,
            epsilon = EPSILON
        );
        assert_relative_eq!(
            corrected.camera_imu_attitude.coords,
            reference.camera_imu_attitude.coords,
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_full_vector_round_trip() {
        let source = populated_state();
        let x = source.to_full_vector();

        assert_eq!(x.fixed_rows::<3>(0).into_owned(), source.position);
        assert_eq!(x[StateBlock::Scale.full_offset()], source.scale);
        // [x, y, z, w] ordering.
        assert_eq!(x[StateBlock::Attitude.full_offset() + 3], source.attitude.w);

        let mut target = State::new();
        target.set_full_vector(&x);
        assert_relative_eq!(target.to_full_vector(), x, epsilon = EPSILON);
        assert_eq!(target.time, 0.0);
        assert_eq!(target.error_covariance, ErrorCovariance::zeros());
    }

    #[test]
    fn test_stub_correction_then_symmetrize_is_symmetric() {
        let mut state = populated_state();
        state.error_covariance = spd_covariance();

        // Position-only measurement, standard (non-Joseph) covariance update.
        let mut h = SMatrix::<f64, 3, N_STATE>::zeros();
        h.fixed_view_mut::<3, 3>(0, StateBlock::Position.error_offset())
            .fill_with_identity();
        let r = nalgebra::Matrix3::identity() * 0.05;
        let p = state.error_covariance;
        let s = h * p * h.transpose() + r;
        let s_inv = s.try_inverse().expect("innovation covariance is invertible");
        let k = p * h.transpose() * s_inv;
        let correction = k * Vector3::new(0.1, -0.2, 0.05);

        state.boxplus(&correction);
        state.error_covariance = (ErrorCovariance::identity() - k * h) * p;
        state.normalize_quaternions();
        state.symmetrize_covariance();

        assert_eq!(state.error_covariance, state.error_covariance.transpose());
        assert!(state.check_invariants(1e-9).is_ok());
    }

    #[test]
    fn test_check_invariants_flags_non_unit_quaternion() {
        let mut state = State::new();
        state.camera_imu_attitude =
            UnitQuaternion::new_unchecked(Quaternion::new(2.0, 0.0, 0.0, 0.0));
        assert_eq!(
            state.check_invariants(1e-9),
            Err(StateError::NonUnitQuaternion {
                field: "camera_imu_attitude",
                norm: 2.0
            })
        );
        state.normalize_quaternions();
        assert_eq!(state.check_invariants(1e-9), Ok(()));
    }

    #[test]
    fn test_check_invariants_flags_bad_covariance() {
        let mut state = State::new();
        state.error_covariance[(0, 1)] = 1.0;
        assert!(matches!(
            state.check_invariants(1e-9),
            Err(StateError::AsymmetricCovariance { .. })
        ));

        state.error_covariance = ErrorCovariance::zeros();
        state.error_covariance[(4, 4)] = -1.0;
        assert_eq!(
            state.check_invariants(1e-9),
            Err(StateError::CovarianceNotPositiveSemiDefinite)
        );
    }

    #[test]
    fn test_reset_state_is_valid_at_zero_tolerance() {
        assert_eq!(State::new().check_invariants(0.0), Ok(()));

        // A singular but PSD covariance with large entries.
        let mut state = State::new();
        let v = ErrorStateVector::from_fn(|i, _| 1e3 * (i as f64 + 1.0));
        state.error_covariance = v * v.transpose();
        state.symmetrize_covariance();
        assert_eq!(state.check_invariants(0.0), Ok(()));

        state.error_covariance[(4, 4)] -= 1e9;
        assert_eq!(
            state.check_invariants(0.0),
            Err(StateError::CovarianceNotPositiveSemiDefinite)
        );
    }

    #[test]
    fn test_check_invariants_flags_non_finite() {
        let mut state = State::new();
        state.velocity.y = f64::NAN;
        assert_eq!(
            state.check_invariants(1e-9),
            Err(StateError::NonFinite { field: "velocity" })
        );
    }

    #[test]
    fn test_advance_time_signals_non_monotonic_timestamps() {
        let mut state = State::new();
        assert_relative_eq!(state.advance_time(0.5).unwrap(), 0.5);
        assert_relative_eq!(state.advance_time(0.75).unwrap(), 0.25);

        assert_eq!(
            state.advance_time(0.75),
            Err(StateError::NonMonotonicTime {
                current: 0.75,
                requested: 0.75
            })
        );
        assert!(state.advance_time(0.1).is_err());
        assert!(state.advance_time(f64::NAN).is_err());
        assert_eq!(state.time, 0.75);
    }

    #[test]
    fn test_set_imu_inputs() {
        let mut state = State::new();
        state.set_imu_inputs(Vector3::new(0.1, 0.2, 0.3), Vector3::new(0.0, 0.0, 9.81));
        assert_eq!(state.angular_velocity_input, Vector3::new(0.1, 0.2, 0.3));
        assert_eq!(state.linear_accel_input.z, 9.81);
    }
}
