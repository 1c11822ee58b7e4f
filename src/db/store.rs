//! Key-value persistence over the `kv_store` table.
//!
//! Every key holds one JSON document and every write replaces it whole. Reads
//! and writes never fail towards the caller: errors are logged and the read
//! falls back to the supplied default while the write is dropped.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, warn};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{de::DeserializeOwned, Serialize};

use super::Database;

#[derive(Clone)]
pub struct KvStore {
    db: Database,
}

fn read_raw(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .with_context(|| format!("failed to read key {key}"))
}

fn write_raw(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )
    .with_context(|| format!("failed to write key {key}"))?;
    Ok(())
}

fn corrupt_backup_key(key: &str) -> String {
    format!("{key}.corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"))
}

impl KvStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let owned_key = key.to_string();
        let raw = self
            .db
            .execute(move |conn| read_raw(conn, &owned_key))
            .await;

        match raw {
            Ok(Some(text)) => match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(err) => {
                    error!("Error decoding stored value for key \"{key}\": {err}");
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                error!("Error reading from store key \"{key}\": {err:#}");
                default
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_string(value) {
            Ok(text) => text,
            Err(err) => {
                error!("Error encoding value for key \"{key}\": {err}");
                return;
            }
        };

        let owned_key = key.to_string();
        if let Err(err) = self
            .db
            .execute(move |conn| write_raw(conn, &owned_key, &serialized))
            .await
        {
            error!("Error writing to store key \"{key}\": {err:#}");
        }
    }

    /// Read-modify-write of one key inside a single write transaction.
    ///
    /// A missing key starts from `T::default()`. A stored value that cannot be
    /// decoded is copied to a `<key>.corrupt-<timestamp>` key and the update
    /// starts over from the default. Returns `None` when the update could not
    /// be applied.
    pub async fn update<T, F, R>(&self, key: &str, mutate: F) -> Option<R>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let owned_key = key.to_string();
        let result = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut value: T = match read_raw(&tx, &owned_key)? {
                    Some(text) => match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(err) => {
                            let backup_key = corrupt_backup_key(&owned_key);
                            write_raw(&tx, &backup_key, &text)?;
                            warn!(
                                "Stored value for key \"{owned_key}\" is unreadable ({err}); \
                                 moved to \"{backup_key}\" and starting from empty"
                            );
                            T::default()
                        }
                    },
                    None => T::default(),
                };

                let outcome = mutate(&mut value);

                let serialized = serde_json::to_string(&value)
                    .with_context(|| format!("failed to encode value for key {owned_key}"))?;
                write_raw(&tx, &owned_key, &serialized)?;
                tx.commit()?;
                Ok(outcome)
            })
            .await;

        match result {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!("Error updating store key \"{key}\": {err:#}");
                None
            }
        }
    }
}
