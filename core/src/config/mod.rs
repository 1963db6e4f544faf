mod load;
mod types;

pub use load::{apply_env_overrides, get_pbench_data_dir, load_default, load_file};
pub use types::{AppConfig, ClientConfig, LoggingConfig, RunConfig};
