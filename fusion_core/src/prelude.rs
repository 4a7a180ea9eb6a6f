// fusion_core/src/prelude.rs

// --- Core Data Structures ---
pub use crate::history::StateHistory;
pub use crate::layout::{StateBlock, N_FULL_STATE, N_STATE};
pub use crate::state::{
    CovarianceBlock, ErrorCovariance, ErrorStateVector, FullStateVector, State,
};

// --- Output Messages ---
pub use crate::messages::{ExtState, PointMsg, PoseMsg, PoseWithCovariance, QuaternionMsg};

// --- Configuration and Errors ---
pub use crate::config::InitialStateConfig;
pub use crate::error::{ConfigError, StateError};
