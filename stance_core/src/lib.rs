// stance_core/src/lib.rs

// Floating-base state estimation for legged robots.
pub mod config;
pub mod error;
pub mod estimation;
pub mod estimator;
pub mod kinematics;
pub mod messages;
pub mod models;
pub mod prelude;
pub mod state;
pub mod types;
pub mod utils;
