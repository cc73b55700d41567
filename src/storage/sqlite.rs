//! SQLite-backed dump history and feature-row sink.
//!
//! Every value reaches SQL through a bound parameter. Column identifiers in
//! feature updates are checked against the fixed catalogue from
//! [`feature_columns`] before they are formatted into a statement.

use super::{Field, FieldValue, FeatureSink, HistoryStore, StoredRow};
use crate::error::{StoreError, StoreResult};
use crate::features::{feature_columns, RowIdentity, WindowSpec};
use crate::records::{DumpEvent, LabelSummary, WindowRecord};
use crate::scopes::ScopeKey;
use chrono::{DateTime, TimeZone, Utc};
use ipnetwork::IpNetwork;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

const HISTORY_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS dumps (
        dump_id INTEGER PRIMARY KEY,
        host TEXT NOT NULL,
        server TEXT NOT NULL,
        url TEXT,
        sha1 TEXT,
        client TEXT,
        referer TEXT,
        timestamp INTEGER NOT NULL,
        corrupt INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_dumps_host ON dumps(host);
    CREATE INDEX IF NOT EXISTS idx_dumps_server ON dumps(server);
    CREATE INDEX IF NOT EXISTS idx_dumps_sha1 ON dumps(sha1);
    CREATE INDEX IF NOT EXISTS idx_dumps_url ON dumps(url);
    CREATE TABLE IF NOT EXISTS label_scans (
        scan_id INTEGER PRIMARY KEY AUTOINCREMENT,
        sha1 TEXT NOT NULL,
        trusted_labels INTEGER,
        total_labels INTEGER,
        scanned_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS dump_scans (
        dump_id INTEGER NOT NULL,
        scan_id INTEGER NOT NULL,
        PRIMARY KEY (dump_id, scan_id)
    );
    CREATE TABLE IF NOT EXISTS routing_prefixes (prefix TEXT PRIMARY KEY);
"#;

const DUMP_COLUMNS: &str =
    "d.dump_id, d.host, d.server, d.url, d.sha1, d.client, d.referer, d.timestamp, d.corrupt";

pub struct SqliteHistory {
    conn: Mutex<Connection>,
    columns: HashSet<String>,
}

impl SqliteHistory {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(HISTORY_SCHEMA)?;
        let catalogue = feature_columns();
        let mut ddl = String::from(
            "CREATE TABLE IF NOT EXISTS feature_rows (
                dump_id INTEGER PRIMARY KEY,
                corrupt INTEGER NOT NULL,
                sha1 TEXT,
                host TEXT",
        );
        for (name, kind) in &catalogue {
            ddl.push_str(&format!(",\n                {name} {}", kind.sql_type()));
        }
        ddl.push_str("\n            );");
        conn.execute_batch(&ddl)?;
        Ok(Self {
            conn: Mutex::new(conn),
            columns: catalogue.into_iter().map(|(name, _)| name).collect(),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }

    /// Append a dump to the history (replaces a dump with the same id).
    pub fn record_dump(&self, dump: &DumpEvent) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO dumps
                (dump_id, host, server, url, sha1, client, referer, timestamp, corrupt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                dump.dump_id,
                dump.host,
                dump.server_address.to_string(),
                dump.url,
                dump.content_hash,
                dump.client,
                dump.referer,
                dump.timestamp.timestamp_millis(),
                dump.corrupt,
            ],
        )?;
        Ok(())
    }

    /// Store a scan report for `sha1`; returns its scan id.
    pub fn record_scan(
        &self,
        sha1: &str,
        summary: LabelSummary,
        scanned_at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO label_scans (sha1, trusted_labels, total_labels, scanned_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                sha1,
                summary.trusted_label_count,
                summary.total_label_count,
                scanned_at.timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Attach a scan report to a dump.
    pub fn link_scan(&self, dump_id: i64, scan_id: i64) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO dump_scans (dump_id, scan_id) VALUES (?1, ?2)",
            params![dump_id, scan_id],
        )?;
        Ok(())
    }

    /// Register a routing prefix. Host bits are cleared before storing, so
    /// `10.1.2.3/8` is kept as `10.0.0.0/8`.
    pub fn add_prefix(&self, prefix: &IpNetwork) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO routing_prefixes (prefix) VALUES (?1)",
            params![format!("{}/{}", prefix.network(), prefix.prefix())],
        )?;
        Ok(())
    }
}

/// Dump columns as read, before address and timestamp are parsed.
struct RawDump {
    dump_id: i64,
    host: String,
    server: String,
    url: Option<String>,
    sha1: Option<String>,
    client: Option<String>,
    referer: Option<String>,
    timestamp_ms: i64,
    corrupt: bool,
}

impl RawDump {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            dump_id: row.get(0)?,
            host: row.get(1)?,
            server: row.get(2)?,
            url: row.get(3)?,
            sha1: row.get(4)?,
            client: row.get(5)?,
            referer: row.get(6)?,
            timestamp_ms: row.get(7)?,
            corrupt: row.get(8)?,
        })
    }

    fn into_event(self) -> StoreResult<DumpEvent> {
        let server_address: IpAddr = self.server.parse().map_err(|_| StoreError::Malformed {
            dump_id: self.dump_id,
            reason: format!("bad server address {:?}", self.server),
        })?;
        let timestamp = Utc
            .timestamp_millis_opt(self.timestamp_ms)
            .single()
            .ok_or_else(|| StoreError::Malformed {
                dump_id: self.dump_id,
                reason: format!("bad timestamp {}", self.timestamp_ms),
            })?;
        Ok(DumpEvent {
            dump_id: self.dump_id,
            host: self.host,
            server_address,
            url: self.url,
            content_hash: self.sha1,
            client: self.client,
            referer: self.referer,
            timestamp,
            corrupt: self.corrupt,
        })
    }
}

/// SQL narrowing for keys that compare a single column; the rest are filtered
/// in memory with [`ScopeKey::matches`].
fn key_clause(key: &ScopeKey) -> Option<(&'static str, Value)> {
    match key {
        ScopeKey::Host(h) => Some(("d.host = ?4", Value::Text(h.clone()))),
        ScopeKey::Server(a) => Some(("d.server = ?4", Value::Text(a.to_string()))),
        ScopeKey::Hash(h) => Some(("d.sha1 = ?4", Value::Text(h.clone()))),
        ScopeKey::Url(u) => Some(("d.url = ?4", Value::Text(u.clone()))),
        ScopeKey::Address(_) | ScopeKey::Domain(_) | ScopeKey::Prefix(_) | ScopeKey::Shape(_) => {
            None
        }
    }
}

impl HistoryStore for SqliteHistory {
    fn dump(&self, dump_id: i64) -> StoreResult<Option<DumpEvent>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {DUMP_COLUMNS} FROM dumps AS d WHERE d.dump_id = ?1"),
                params![dump_id],
                RawDump::from_row,
            )
            .optional()?;
        raw.map(RawDump::into_event).transpose()
    }

    fn scan_window(&self, key: &ScopeKey, window: &WindowSpec) -> StoreResult<Vec<WindowRecord>> {
        let mut sql = format!(
            "SELECT {DUMP_COLUMNS}, s.scan_id, s.trusted_labels, s.total_labels
             FROM dumps AS d
             LEFT JOIN label_scans AS s ON s.scan_id = (
                 SELECT MAX(m.scan_id) FROM dump_scans AS m WHERE m.dump_id = d.dump_id)
             WHERE d.corrupt = 0
               AND d.dump_id < ?1 AND d.dump_id > ?2
               AND (?3 IS NULL OR d.timestamp > ?3)"
        );
        let mut values = vec![
            Value::Integer(window.dump_id),
            Value::Integer(window.lower_bound()),
            window
                .not_before
                .map_or(Value::Null, |t| Value::Integer(t.timestamp_millis())),
        ];
        if let Some((clause, value)) = key_clause(key) {
            sql.push_str(" AND ");
            sql.push_str(clause);
            values.push(value);
        }
        sql.push_str(" ORDER BY d.dump_id");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            let raw = RawDump::from_row(row)?;
            let scan_id: Option<i64> = row.get(9)?;
            let labels = match scan_id {
                Some(_) => Some(LabelSummary::new(row.get(10)?, row.get(11)?)),
                None => None,
            };
            Ok((raw, labels))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (raw, labels) = row?;
            let event = raw.into_event()?;
            if window.contains(&event) && key.matches(&event) {
                out.push(WindowRecord { event, labels });
            }
        }
        Ok(out)
    }

    fn containing_prefix(&self, addr: IpAddr) -> StoreResult<Option<IpNetwork>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT prefix FROM routing_prefixes")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut best: Option<IpNetwork> = None;
        for row in rows {
            let text = row?;
            let network = match text.parse::<IpNetwork>() {
                Ok(p) => p,
                Err(e) => {
                    warn!(prefix = %text, error = %e, "skipping malformed routing prefix");
                    continue;
                }
            };
            if network.contains(addr) && best.map_or(true, |b| network.prefix() > b.prefix()) {
                best = Some(network);
            }
        }
        Ok(best)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(v) => ToSqlOutput::from(*v),
            FieldValue::Real(v) => ToSqlOutput::from(*v),
            FieldValue::Text(v) => ToSqlOutput::from(v.as_str()),
        })
    }
}

fn field_value(v: ValueRef<'_>) -> FieldValue {
    match v {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(i) => FieldValue::Integer(i),
        ValueRef::Real(r) => FieldValue::Real(r),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            FieldValue::Text(String::from_utf8_lossy(t).into_owned())
        }
    }
}

impl FeatureSink for SqliteHistory {
    fn reset_row(&self, identity: &RowIdentity) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM feature_rows WHERE dump_id = ?1",
            params![identity.dump_id],
        )?;
        tx.execute(
            "INSERT INTO feature_rows (dump_id, corrupt, sha1, host) VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.dump_id,
                identity.corrupt,
                identity.content_hash,
                identity.host,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn update_group(&self, dump_id: i64, fields: &[Field]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut assignments = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if !self.columns.contains(&field.column) {
                return Err(StoreError::Query(format!(
                    "unknown feature column {:?}",
                    field.column
                )));
            }
            assignments.push(format!("{} = ?{}", field.column, i + 1));
        }
        let sql = format!(
            "UPDATE feature_rows SET {} WHERE dump_id = ?{}",
            assignments.join(", "),
            fields.len() + 1
        );

        let mut values: Vec<&dyn ToSql> = fields.iter().map(|f| &f.value as &dyn ToSql).collect();
        values.push(&dump_id);

        let updated = self.conn()?.execute(&sql, values.as_slice())?;
        if updated == 0 {
            return Err(StoreError::Query(format!("no feature row for dump {dump_id}")));
        }
        Ok(())
    }

    fn feature_row(&self, dump_id: i64) -> StoreResult<Option<StoredRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM feature_rows WHERE dump_id = ?1")?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let row = stmt
            .query_row(params![dump_id], |row| {
                let mut out = StoredRow::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.clone(), field_value(row.get_ref(i)?));
                }
                Ok(out)
            })
            .optional()?;
        Ok(row)
    }
}
