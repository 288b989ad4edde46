//! Rental index loading module.

use std::path::Path;

use crate::config::env::APP_CONFIG;
use crate::error::{AppError, AppResult};
use crate::matching::RentalIndex;

/// Loads the rental index configured by `RENTAL_INDEX_PATH`.
pub async fn init_rental_index() -> AppResult<RentalIndex> {
    load_rental_index(&APP_CONFIG.rental_index_path).await
}

/// Reads and parses a rental index file.
///
/// # Errors
///
/// Returns `AppError::Internal` when the file is missing, and a JSON error
/// when it cannot be parsed.
pub async fn load_rental_index(path: impl AsRef<Path>) -> AppResult<RentalIndex> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AppError::Internal(format!(
            "Cannot read rental index at {}: {e}. Run the `build-index` binary first.",
            path.display()
        ))
    })?;

    let index: RentalIndex = serde_json::from_slice(&bytes)?;
    tracing::info!(
        path = %path.display(),
        rentals = index.len(),
        "Rental index loaded"
    );

    Ok(index)
}

/// Writes a rental index file, creating parent directories as needed.
pub async fn save_rental_index(path: impl AsRef<Path>, index: &RentalIndex) -> AppResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let data = serde_json::to_vec_pretty(index)?;
    tokio::fs::write(path, data).await?;

    tracing::info!(path = %path.display(), rentals = index.len(), "Rental index written");
    Ok(())
}
