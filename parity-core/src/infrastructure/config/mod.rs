// parity-core/src/infrastructure/config/mod.rs

pub mod placeholders;
pub mod rules;
pub mod settings;

pub use rules::{RuleFilter, check_stores, load_rules, load_rules_with, select_rules};
pub use settings::{
    ChunkSettings, ProjectSettings, RetrySettings, RunSettings, StoreConfig, StoreEngine,
    load_project_settings, load_project_settings_with,
};
