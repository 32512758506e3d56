use motorwatch_core::{MotorId, Timestamp};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{TelemetryError, TelemetryResult};
use crate::reading::{MotorReading, NewReading};

const COLUMNS: &str =
    "id, motor_id, temperature, voltage, current, x, y, z, status, recorded_at";

/// SQLite-backed table of motor readings. Rows are append-only; ids grow
/// with arrival order.
pub struct ReadingStore {
    conn: Mutex<Connection>,
}

impl ReadingStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> TelemetryResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| TelemetryError::Storage(format!("failed to open database: {}", e)))?;
        Self::init(conn)
    }

    /// In-memory database, for tests.
    pub fn in_memory() -> TelemetryResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TelemetryError::Storage(format!("failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> TelemetryResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS motor_readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                motor_id TEXT NOT NULL,
                temperature REAL NOT NULL,
                voltage REAL NOT NULL,
                current REAL NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                z REAL NOT NULL,
                status TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );",
        )
        .map_err(|e| TelemetryError::Storage(format!("failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> TelemetryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TelemetryError::Storage(format!("lock poisoned: {}", e)))
    }

    pub fn count(&self) -> TelemetryResult<u64> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM motor_readings", [], |row| row.get(0))
            .map_err(|e| TelemetryError::Storage(format!("count failed: {}", e)))?;
        Ok(n.max(0) as u64)
    }

    pub fn append(&self, reading: NewReading) -> TelemetryResult<MotorReading> {
        let conn = self.lock()?;
        insert(&conn, reading)
    }

    /// Append the tail of a `total`-entry source that the table has not
    /// seen yet, treating the current row count as the number of entries
    /// already stored. `fresh` receives that count (capped at `total`) and
    /// returns the readings to append.
    ///
    /// Count, skip and inserts run under one lock inside one transaction:
    /// concurrent calls cannot both claim the same entries, and a failure
    /// leaves the table untouched. Returns `(skipped, added)`.
    pub fn append_unseen<F>(&self, total: usize, fresh: F) -> TelemetryResult<(usize, usize)>
    where
        F: FnOnce(usize) -> TelemetryResult<Vec<NewReading>>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| TelemetryError::Storage(format!("begin failed: {}", e)))?;
        let stored: i64 = tx
            .query_row("SELECT COUNT(*) FROM motor_readings", [], |row| row.get(0))
            .map_err(|e| TelemetryError::Storage(format!("count failed: {}", e)))?;
        let skipped = usize::try_from(stored.max(0))
            .unwrap_or(usize::MAX)
            .min(total);

        let readings = fresh(skipped)?;
        let added = readings.len();
        for reading in readings {
            insert(&tx, reading)?;
        }
        tx.commit()
            .map_err(|e| TelemetryError::Storage(format!("commit failed: {}", e)))?;
        Ok((skipped, added))
    }

    /// The newest `limit` readings, oldest first.
    pub fn latest(&self, limit: usize) -> TelemetryResult<Vec<MotorReading>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM motor_readings ORDER BY id DESC LIMIT ?1",
                COLUMNS
            ))
            .map_err(|e| TelemetryError::Storage(format!("query failed: {}", e)))?;
        let rows = stmt
            .query_map(params![limit as i64], raw_row)
            .map_err(|e| TelemetryError::Storage(format!("query failed: {}", e)))?;

        let mut readings = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| TelemetryError::Storage(format!("row failed: {}", e)))?;
            readings.push(raw.into_reading()?);
        }
        readings.reverse();
        Ok(readings)
    }

    pub fn get(&self, id: i64) -> TelemetryResult<Option<MotorReading>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM motor_readings WHERE id = ?1", COLUMNS),
            params![id],
            raw_row,
        );
        match result {
            Ok(raw) => Ok(Some(raw.into_reading()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TelemetryError::Storage(format!("query failed: {}", e))),
        }
    }
}

fn insert(conn: &Connection, reading: NewReading) -> TelemetryResult<MotorReading> {
    conn.execute(
        "INSERT INTO motor_readings
            (motor_id, temperature, voltage, current, x, y, z, status, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            reading.motor_id.as_str(),
            reading.temperature,
            reading.voltage,
            reading.current,
            reading.x,
            reading.y,
            reading.z,
            reading.status,
            reading.recorded_at.to_rfc3339(),
        ],
    )
    .map_err(|e| TelemetryError::Storage(format!("insert failed: {}", e)))?;
    Ok(reading.with_id(conn.last_insert_rowid()))
}

/// Row as stored, before the identifier and timestamp are validated.
struct RawRow {
    id: i64,
    motor_id: String,
    values: [f64; 6],
    status: String,
    recorded_at: String,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        motor_id: row.get(1)?,
        values: [
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ],
        status: row.get(8)?,
        recorded_at: row.get(9)?,
    })
}

impl RawRow {
    fn into_reading(self) -> TelemetryResult<MotorReading> {
        let [temperature, voltage, current, x, y, z] = self.values;
        Ok(MotorReading {
            id: self.id,
            motor_id: MotorId::new(self.motor_id)?,
            temperature,
            voltage,
            current,
            x,
            y,
            z,
            status: self.status,
            recorded_at: Timestamp::parse_rfc3339(&self.recorded_at)?,
        })
    }
}
