// parity-core/src/infrastructure/adapters/mod.rs

pub mod duckdb;

pub use self::duckdb::{DuckDbConnector, DuckDbDriver};
