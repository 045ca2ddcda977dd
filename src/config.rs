//! TOML configuration.
//!
//! Every key is optional:
//!
//! ```toml
//! fill_value = -9999.9
//! coordinate_policy = "warn-use-first"
//!
//! [authority_map]
//! old = "new"
//!
//! [station_map]
//! "new:41001" = "wmo:41001"
//!
//! [copy]
//! enabled = true
//! destination = "/data/sensors"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::crawl::CopyPolicy;
use crate::error::Result;
use crate::merge::CoordinatePolicy;
use crate::reconcile::DEFAULT_FILL_VALUE;
use crate::urn::IdentityMaps;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Sentinel for absent verticals and values
    #[serde(default = "default_fill_value")]
    pub fill_value: f64,

    #[serde(default)]
    pub coordinate_policy: CoordinatePolicy,

    /// `authority_map` and `station_map` tables
    #[serde(flatten)]
    pub maps: IdentityMaps,

    #[serde(default)]
    pub copy: CopyPolicy,
}

fn default_fill_value() -> f64 {
    DEFAULT_FILL_VALUE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fill_value: DEFAULT_FILL_VALUE,
            coordinate_policy: CoordinatePolicy::default(),
            maps: IdentityMaps::default(),
            copy: CopyPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
