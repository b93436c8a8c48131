pub mod loader;
pub mod schema;

pub use loader::{discover, load_from_path, load_from_str, ConfigError, CONFIG_FILE};
pub use schema::{
    ApplyConfig, CheckpointConfig, ForkConfig, RebuildConfig, Strategy, ValidationError,
    ValidationIssue,
};
