pub mod config;
pub mod error;
pub mod json_bridge;
pub mod profile;
pub mod schema;
pub mod store;

pub use config::{LoadedConfig, load_config, load_config_file, parse_config, resolve_config_path};
pub use error::{Result, StoreError};
pub use profile::{DEFAULT_PROFILE, ProfileStore, default_base_dir, list_profiles, sanitize_name};
pub use store::{Store, StoredInteraction};
