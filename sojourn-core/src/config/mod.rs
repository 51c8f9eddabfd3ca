//! Instance configuration, fixed at init.
//!
//! ```toml
//! capacity = 1024
//! algorithm = "codel"
//! target = "5ms"
//! interval = 100 # milliseconds
//! ```

#[cfg(feature = "serde")]
use std::path::Path;

#[cfg(feature = "serde")]
use figment::{
    providers::{Format, Json, Toml},
    Figment,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use tracing::{debug, warn};

use crate::algorithm::{
    AlgorithmKind, CoDelConfig, FifoConfig, PieConfig, RedConfig, WredConfig,
};
#[cfg(feature = "serde")]
use crate::error::{ConfigError, Result};

pub const DEFAULT_CAPACITY: usize = 1024;

#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(tag = "algorithm", rename_all = "lowercase")
)]
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmConfig {
    Fifo(FifoConfig),
    Red(RedConfig),
    Wred(WredConfig),
    CoDel(CoDelConfig),
    Pie(PieConfig),
}

impl AlgorithmConfig {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            AlgorithmConfig::Fifo(_) => AlgorithmKind::Fifo,
            AlgorithmConfig::Red(_) => AlgorithmKind::Red,
            AlgorithmConfig::Wred(_) => AlgorithmKind::Wred,
            AlgorithmConfig::CoDel(_) => AlgorithmKind::CoDel,
            AlgorithmConfig::Pie(_) => AlgorithmKind::Pie,
        }
    }

    /// Default parameters of the given algorithm.
    pub fn default_for(kind: AlgorithmKind) -> Self {
        match kind {
            AlgorithmKind::Fifo => FifoConfig::default().into(),
            AlgorithmKind::Red => RedConfig::default().into(),
            AlgorithmKind::Wred => WredConfig::default().into(),
            AlgorithmKind::CoDel => CoDelConfig::default().into(),
            AlgorithmKind::Pie => PieConfig::default().into(),
        }
    }
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        AlgorithmConfig::Fifo(FifoConfig::default())
    }
}

macro_rules! impl_from_config {
    ($($config:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$config> for AlgorithmConfig {
                fn from(config: $config) -> Self {
                    AlgorithmConfig::$variant(config)
                }
            }
        )*
    };
}

impl_from_config!(
    FifoConfig => Fifo,
    RedConfig => Red,
    WredConfig => Wred,
    CoDelConfig => CoDel,
    PieConfig => Pie,
);

#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AqmConfig {
    pub capacity: usize, // in packets
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub algorithm: AlgorithmConfig,
}

impl Default for AqmConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            algorithm: AlgorithmConfig::default(),
        }
    }
}

impl AqmConfig {
    pub fn new<A: Into<AlgorithmConfig>>(capacity: usize, algorithm: A) -> Self {
        Self {
            capacity,
            algorithm: algorithm.into(),
        }
    }
}

#[cfg(feature = "serde")]
impl AqmConfig {
    /// Load a config from a `.toml` or `.json` file.
    pub fn from_file<T: AsRef<Path>>(path: T) -> Result<Self> {
        let file_path = path.as_ref();
        let figment = match file_path.extension() {
            Some(ext) if ext == "json" => Figment::new().merge(Json::file(file_path)),
            Some(ext) if ext == "toml" => Figment::new().merge(Toml::file(file_path)),
            _ => {
                warn!(path = %file_path.display(), "Unknown config file format");
                return Err(ConfigError::Load(format!(
                    "Unknown config file format: {}",
                    file_path.display()
                ))
                .into());
            }
        };
        let config: AqmConfig = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        debug!(?config, path = %file_path.display(), "Load AQM config");
        Ok(config)
    }
}
