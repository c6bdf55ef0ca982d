//! Settings shared by the resolver and field lists
//!
//! Settings can be built in code or loaded from TOML. Every section and key is optional
//! and falls back to its default.
//!
//! ```rust
//! use gridfield_core::config::Settings;
//!
//! let settings = Settings::from_toml_str(
//!     r#"
//!     [listing]
//!     ls_keys = ["param", "level"]
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(settings.listing.ls_keys, vec!["param", "level"]);
//! assert_eq!(settings.resolver.spacing_tolerance, 1e-9);
//! ```

use crate::errors::{FieldError, FieldResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Relative tolerance used when deciding whether distinct coordinates are evenly spaced
    pub spacing_tolerance: f64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            spacing_tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSettings {
    /// Columns produced by `FieldList::ls` when no keys are given
    pub ls_keys: Vec<String>,
    /// Keys summarised by `FieldList::indices`
    pub index_keys: Vec<String>,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            ls_keys: to_strings(&[
                "param",
                "level",
                "base_datetime",
                "valid_datetime",
                "step",
                "number",
            ]),
            index_keys: to_strings(&[
                "param",
                "level",
                "levtype",
                "step",
                "number",
                "base_datetime",
                "valid_datetime",
            ]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub resolver: ResolverSettings,
    pub listing: ListingSettings,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> FieldResult<Self> {
        let settings: Settings =
            toml::from_str(s).map_err(|e| FieldError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> FieldResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FieldError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> FieldResult<String> {
        toml::to_string(self).map_err(|e| FieldError::Config(e.to_string()))
    }

    fn validate(&self) -> FieldResult<()> {
        let tol = self.resolver.spacing_tolerance;
        if !tol.is_finite() || tol < 0.0 {
            return Err(FieldError::Config(format!(
                "spacing_tolerance must be a finite non-negative number, got {}",
                tol
            )));
        }
        Ok(())
    }
}

fn to_strings(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}
