// parity-core/src/domain/compliance/mod.rs

pub mod outlier;
pub mod tolerance;
