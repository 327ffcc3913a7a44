// parity-core/src/domain/compiler/mod.rs

pub mod quoter;
pub mod readonly;
