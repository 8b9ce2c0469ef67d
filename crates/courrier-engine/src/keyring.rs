//! Key persistence for the at-rest encryption service.
//!
//! The key itself is pure data owned by `courrier_shared::crypto`; this
//! module is the glue that keeps the exported blob under the well-known
//! settings key.  Losing that settings row makes all stored ciphertext
//! permanently unreadable, which is why import never touches the active
//! key until the candidate blob has validated.

use courrier_shared::constants::SETTING_ENCRYPTION_KEY;
use courrier_shared::crypto::{self, SymmetricKey};

use crate::error::EngineError;
use courrier_sync::SharedDatabase;

/// Load the persisted key, generating and persisting one on first run.
pub fn get_or_create_key(store: &SharedDatabase) -> Result<SymmetricKey, EngineError> {
    let db = store.lock().map_err(|_| EngineError::LockPoisoned)?;

    if let Some(blob) = db.get_setting(SETTING_ENCRYPTION_KEY)? {
        let key = crypto::import_key(&blob)?;
        tracing::debug!("encryption key loaded");
        return Ok(key);
    }

    let key = crypto::generate_symmetric_key();
    let blob = crypto::export_key(&key)?;
    db.set_setting(SETTING_ENCRYPTION_KEY, &blob)?;
    tracing::info!("encryption key generated and persisted");
    Ok(key)
}

/// Export the active key as an opaque backup blob.
pub fn export_key_blob(key: &SymmetricKey) -> Result<String, EngineError> {
    Ok(crypto::export_key(key)?)
}

/// Validate and persist an imported key blob, returning the new active key.
///
/// A blob that fails validation leaves the stored key untouched.
pub fn import_key_blob(store: &SharedDatabase, blob: &str) -> Result<SymmetricKey, EngineError> {
    // Validation happens before any store mutation.
    let key = crypto::import_key(blob)?;

    let db = store.lock().map_err(|_| EngineError::LockPoisoned)?;
    db.set_setting(SETTING_ENCRYPTION_KEY, blob)?;
    tracing::info!("encryption key imported");
    Ok(key)
}
