pub mod tables;

use redb::{Database, Error as RedbError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Database handle type (Arc-wrapped for sharing across handlers)
pub type Db = Arc<Database>;

/// Bincode configuration used for every stored record
pub const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// Serialize a record for storage
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(value, BINCODE_CONFIG)?)
}

/// Deserialize a stored record
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, BINCODE_CONFIG)?;
    Ok(value)
}

/// Build the composite key for a sub-resource of an event
/// (tables, files). Prefix scans over `"{code}:"` enumerate them.
pub fn scoped_key(event_code: &str, id: &str) -> String {
    format!("{}:{}", event_code, id)
}

/// Range bounds covering every key scoped to the given event code.
/// `';'` is the successor of `':'` in ASCII, so `code:` .. `code;`
/// spans exactly the keys with that prefix.
pub fn scope_bounds(event_code: &str) -> (String, String) {
    (format!("{}:", event_code), format!("{};", event_code))
}

/// Open or create the redb database at the given path
///
/// Creates all required tables on first run.
#[allow(clippy::result_large_err)]
pub fn open_database(path: impl AsRef<Path>) -> std::result::Result<Db, RedbError> {
    tracing::info!("Opening database at: {:?}", path.as_ref());

    // Create parent directory if it doesn't exist
    if let Some(parent) = path.as_ref().parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                tracing::error!("Failed to create database directory: {}", e);
                RedbError::Io(e)
            })?;
        }
    }

    let db = Database::create(path)?;

    // Initialize tables on first run
    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(tables::EVENTS)?;
        let _ = write_txn.open_table(tables::EVENT_TABLES)?;
        let _ = write_txn.open_table(tables::FILES)?;
        let _ = write_txn.open_table(tables::USERS)?;
        let _ = write_txn.open_table(tables::SESSIONS)?;
        let _ = write_txn.open_table(tables::BETA_CODES)?;
        let _ = write_txn.open_table(tables::ACTIVITY)?;
        let _ = write_txn.open_table(tables::UPLOAD_WINDOWS)?;
    }
    write_txn.commit()?;

    tracing::info!("Database initialized successfully");

    Ok(Arc::new(db))
}
