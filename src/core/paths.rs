use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base drydock config directory (~/.config/drydock/ on all Unix-likes)
pub fn drydock() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("drydock"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("drydock"))
    }
}

/// Global drydock.json config file path
pub fn drydock_json() -> Result<PathBuf> {
    Ok(drydock()?.join("drydock.json"))
}

/// Aliases directory
pub fn aliases() -> Result<PathBuf> {
    Ok(drydock()?.join("aliases"))
}
