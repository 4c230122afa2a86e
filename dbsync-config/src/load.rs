use std::path::{Path, PathBuf};

use config::FileFormat;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::shared::ValidationError;

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Separator for list elements in environment variables.
const LIST_SEPARATOR: &str = ",";

/// Trait implemented by configuration structures that can be loaded from a file.
pub trait Config {
    /// Keys whose values should be parsed as lists when loading the configuration.
    const LIST_PARSE_KEYS: &'static [&'static str];

    /// Checks invariants that deserialization alone cannot express.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Coarse classification of [`LoadConfigError`], used by callers to pick an error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadConfigErrorKind {
    /// The configuration file does not exist.
    NotFound,
    /// The file could not be parsed or a required value is missing or empty.
    Malformed,
    /// Every value is present but at least one is out of range.
    Invalid,
}

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// The configuration file does not exist.
    #[error("configuration file `{0}` not found")]
    NotFound(PathBuf),

    /// The file is not valid JSON or does not match the expected structure.
    #[error("failed to parse configuration file `{path}`: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    /// A required value is present but empty.
    #[error("configuration file `{path}` is missing a required value: {source}")]
    MissingValue {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    /// The configuration parsed but failed validation.
    #[error("invalid configuration in `{path}`: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

impl LoadConfigError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> LoadConfigErrorKind {
        match self {
            LoadConfigError::NotFound(_) => LoadConfigErrorKind::NotFound,
            LoadConfigError::Malformed { .. } | LoadConfigError::MissingValue { .. } => {
                LoadConfigErrorKind::Malformed
            }
            LoadConfigError::Invalid { .. } => LoadConfigErrorKind::Invalid,
        }
    }
}

/// Loads a JSON configuration file and applies environment-variable overrides.
///
/// Values from `path` are read first, then overridden by `APP_`-prefixed environment variables.
/// Nested keys use double underscores (`APP_DATABASE__PASSWORD`), and list values are
/// comma-separated. The result is validated before it is returned.
///
/// Loading has no side effects, so loading the same file twice yields equal values.
pub fn load_config_file<T>(path: impl AsRef<Path>) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let path = path.as_ref();

    if !path.is_file() {
        return Err(LoadConfigError::NotFound(path.to_path_buf()));
    }

    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in <T as Config>::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let malformed = |source| LoadConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(path).format(FileFormat::Json))
        .add_source(environment_source)
        .build()
        .map_err(malformed)?;

    let config = settings.try_deserialize::<T>().map_err(malformed)?;

    config.validate().map_err(|source| {
        if source.is_missing_value() {
            LoadConfigError::MissingValue {
                path: path.to_path_buf(),
                source,
            }
        } else {
            LoadConfigError::Invalid {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    Ok(config)
}
