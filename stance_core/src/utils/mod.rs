// stance_core/src/utils/mod.rs

pub mod matrix;
pub mod so3;
