use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

/// File looked up in the working directory when no path is given (any format
/// the `config` crate knows, e.g. `keeper.toml`).
pub const DEFAULT_CONFIG_FILE: &str = "keeper";

#[keeper_derive::keeper_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Loads layered configuration: a file first, then `KEEPER__` environment overrides.
///
/// Nested keys use double underscores, so `KEEPER__DATABASE__URL` maps to `database.url`.
/// An explicit `path` must exist. Without one, the default `keeper` file is optional and
/// a missing file leaves every section at its defaults.
///
/// # Errors
/// Fails if an explicit file is missing, or the merged values do not fit `T`.
///
/// # Example
/// ```rust
/// use keeper_kernel::config::load_config;
///
/// #[derive(Default, serde::Deserialize)]
/// struct AppConfig {
///     port: u16,
/// }
///
/// let cfg: AppConfig = load_config(Some("config/local")).unwrap_or_default();
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let required = path.is_some();
    let effective_path =
        path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), |p| p.as_ref().to_path_buf());

    let builder = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(required))
        .add_source(
            Environment::with_prefix("KEEPER")
                .separator("__")
                .try_parsing(true)
                .convert_case(config::Case::Snake),
        );

    info!(path = %effective_path.display(), required, "Loading config");

    let config = builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}
