//! SQLite store for captured-image metadata.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Row, params};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{CapturedImageRecord, NewCapturedImage, StoreError};

mod schema;

pub use schema::SCHEMA_VERSION;

const SELECT_ALL: &str = "SELECT id, image_path, temperature, humidity, wind_speed,
        weather_description, weather_icon_code, city_name, timestamp
     FROM captured_images ORDER BY timestamp DESC, id DESC";

/// Owned handle to the image database.
///
/// Every successful write re-publishes the full list to subscribers, so
/// [`ImageStore::subscribe`] behaves like a live query.
pub struct ImageStore {
    conn: Mutex<Connection>,
    changes: watch::Sender<Vec<CapturedImageRecord>>,
}

impl std::fmt::Debug for ImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStore")
            .field("subscribers", &self.changes.receiver_count())
            .finish_non_exhaustive()
    }
}

impl ImageStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        schema::initialize(&conn)?;
        let initial = query_all(&conn)?;
        let (changes, _) = watch::channel(initial);

        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert a new row and return its id. Uses insert-or-replace semantics.
    pub fn insert(&self, image: &NewCapturedImage) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO captured_images
                (image_path, temperature, humidity, wind_speed, weather_description,
                 weather_icon_code, city_name, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                image.image_path,
                image.reading.temperature_c,
                image.reading.humidity_pct,
                image.reading.wind_speed_mps,
                image.reading.description,
                image.reading.icon_code,
                image.reading.city_name,
                image.timestamp_ms,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, path = %image.image_path, "inserted captured image");

        self.publish(&conn);
        Ok(id)
    }

    /// Delete one row. Returns whether a row was removed.
    ///
    /// The referenced image file is not touched.
    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM captured_images WHERE id = ?1", [id])?;
        debug!(id, removed, "deleted captured image");

        if removed > 0 {
            self.publish(&conn);
        }
        Ok(removed > 0)
    }

    pub fn get(&self, id: i64) -> Result<Option<CapturedImageRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, image_path, temperature, humidity, wind_speed,
                    weather_description, weather_icon_code, city_name, timestamp
             FROM captured_images WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], record_from_row)?;
        let record = rows.next().transpose()?;
        Ok(record)
    }

    /// Full table, most recent first.
    pub fn all_by_recency(&self) -> Result<Vec<CapturedImageRecord>, StoreError> {
        let conn = self.conn()?;
        query_all(&conn)
    }

    /// Live view of [`ImageStore::all_by_recency`].
    pub fn subscribe(&self) -> watch::Receiver<Vec<CapturedImageRecord>> {
        self.changes.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Close the connection. Subscribers see their channel close.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self.conn.into_inner().map_err(|_| StoreError::Poisoned)?;
        conn.close().map_err(|(_, e)| StoreError::Database(e))
    }

    fn publish(&self, conn: &Connection) {
        match query_all(conn) {
            Ok(list) => {
                self.changes.send_replace(list);
            }
            Err(e) => warn!("failed to refresh captured image list: {e}"),
        }
    }
}

fn query_all(conn: &Connection) -> Result<Vec<CapturedImageRecord>, StoreError> {
    let mut stmt = conn.prepare(SELECT_ALL)?;
    let records = stmt
        .query_map([], record_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CapturedImageRecord> {
    Ok(CapturedImageRecord {
        id: row.get(0)?,
        image_path: row.get(1)?,
        temperature_c: row.get(2)?,
        humidity_pct: row.get(3)?,
        wind_speed_mps: row.get(4)?,
        description: row.get(5)?,
        icon_code: row.get(6)?,
        city_name: row.get(7)?,
        timestamp_ms: row.get(8)?,
    })
}
