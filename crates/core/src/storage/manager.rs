use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::CoreError;
use crate::models::portfolio::{default_portfolio, Portfolio};
use crate::models::settings::Settings;

/// Save/load of the portfolio record and settings as JSON.
///
/// A missing file is not an error: loading falls back to the defaults.
pub struct StorageManager;

impl StorageManager {
    /// Serialize a portfolio to a JSON string.
    pub fn portfolio_to_json(portfolio: &Portfolio) -> Result<String, CoreError> {
        to_json(portfolio, "portfolio")
    }

    /// Parse a portfolio from JSON. Accepts the legacy `amount` field name.
    pub fn portfolio_from_json(json: &str) -> Result<Portfolio, CoreError> {
        from_json(json, "portfolio")
    }

    /// Load a portfolio from disk; `[BTC 1, ETH 2]` when the file does not exist.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_portfolio(path: impl AsRef<Path>) -> Result<Portfolio, CoreError> {
        match read_if_exists(path.as_ref())? {
            Some(json) => Self::portfolio_from_json(&json),
            None => Ok(default_portfolio()),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_portfolio(portfolio: &Portfolio, path: impl AsRef<Path>) -> Result<(), CoreError> {
        std::fs::write(path, Self::portfolio_to_json(portfolio)?)?;
        Ok(())
    }

    /// Load settings from disk; defaults when the file does not exist.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, CoreError> {
        match read_if_exists(path.as_ref())? {
            Some(json) => from_json(&json, "settings"),
            None => Ok(Settings::default()),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_settings(settings: &Settings, path: impl AsRef<Path>) -> Result<(), CoreError> {
        std::fs::write(path, to_json(settings, "settings")?)?;
        Ok(())
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String, CoreError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CoreError::Serialization(format!("Failed to serialize {what}: {e}")))
}

fn from_json<T: DeserializeOwned>(json: &str, what: &str) -> Result<T, CoreError> {
    serde_json::from_str(json)
        .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize {what}: {e}")))
}

#[cfg(not(target_arch = "wasm32"))]
fn read_if_exists(path: &Path) -> Result<Option<String>, CoreError> {
    match std::fs::read_to_string(path) {
        Ok(json) => Ok(Some(json)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
