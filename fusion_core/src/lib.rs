// fusion_core/src/lib.rs

//! State container for an error-state (indirect) Kalman filter fusing IMU and
//! vision: the manifold-valued full state, its minimal error state, the error
//! covariance, and conversions to plain output messages.
//!
//! Propagation and correction live outside this crate. They read from and write
//! into a [`State`](state::State) through the index map in [`layout`].

pub mod config;
pub mod error;
pub mod history;
pub mod layout;
pub mod messages;
pub mod prelude;
pub mod serde_helpers;
pub mod state;
