use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

use super::{types::Config, ConfigError};

/// Environment override prefix. Nested keys use a double underscore,
/// e.g. `SEERRBRIDGE_QUEUE__MOVIE_MAX_SIZE=50`.
pub const ENV_PREFIX: &str = "SEERRBRIDGE_";

fn env_overrides() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

/// Read `path` and apply environment overrides on top.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    Figment::from(Toml::file(path))
        .merge(env_overrides())
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Parse a TOML document with no environment layer.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
}
