//! SQLite-backed notification record store.
//!
//! One row per notification; the schedule history is kept as a JSON array in the
//! same row so every store operation touches a single row.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

use medinotify_core::{
    Frequency, Notification, NotificationFilter, NotificationStore, NotifyError, Priority, Result,
    ScheduleEntry, ScheduleStatus, SortOrder,
};

const COLUMNS: &str = "id, sender, recipient, content, is_future, scheduled_date, scheduled_time, \
                       is_recurring, frequency, schedule_history, created_at, requested_schedule";

fn store_err(context: &str) -> impl Fn(rusqlite::Error) -> NotifyError + '_ {
    move |e| NotifyError::Store(format!("{context}: {e}"))
}

/// Fixed-width timestamps so text ordering matches time ordering.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Columns as stored, before conversion into the domain type.
struct RawRow {
    id: String,
    sender: String,
    recipient: String,
    content: String,
    is_future: bool,
    scheduled_date: Option<String>,
    scheduled_time: Option<String>,
    is_recurring: bool,
    frequency: Option<String>,
    schedule_history: String,
    created_at: String,
    requested_schedule: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender: row.get(1)?,
            recipient: row.get(2)?,
            content: row.get(3)?,
            is_future: row.get::<_, i32>(4)? != 0,
            scheduled_date: row.get(5)?,
            scheduled_time: row.get(6)?,
            is_recurring: row.get::<_, i32>(7)? != 0,
            frequency: row.get(8)?,
            schedule_history: row.get(9)?,
            created_at: row.get(10)?,
            requested_schedule: row.get(11)?,
        })
    }

    fn into_notification(self) -> Result<Notification> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            NotifyError::Store(format!("notification {}: bad {field}: {e}", self.id))
        };
        let scheduled_date = self
            .scheduled_date
            .as_deref()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| corrupt("scheduled_date", &e))?;
        let scheduled_time = self
            .scheduled_time
            .as_deref()
            .map(|t| NaiveTime::parse_from_str(t, "%H:%M:%S"))
            .transpose()
            .map_err(|e| corrupt("scheduled_time", &e))?;
        let frequency: Option<Frequency> = self
            .frequency
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt("frequency", &e))?;
        let schedule_history: Vec<ScheduleEntry> =
            serde_json::from_str(&self.schedule_history).map_err(|e| corrupt("schedule_history", &e))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| corrupt("created_at", &e))?;

        Ok(Notification {
            id: self.id,
            sender_identity: self.sender,
            recipient_identity: self.recipient,
            content: self.content,
            is_future: self.is_future,
            scheduled_date,
            scheduled_time,
            requested_schedule: self.requested_schedule,
            is_recurring: self.is_recurring,
            frequency,
            schedule_history,
            created_at,
        })
    }
}

/// SQLite notification store.
pub struct SqliteNotificationStore {
    conn: Mutex<Connection>,
}

impl SqliteNotificationStore {
    /// Open or create the notification database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err("DB open"))?;
        // WAL for concurrent readers; not available for :memory:.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                content TEXT NOT NULL,
                is_future INTEGER NOT NULL DEFAULT 0,
                scheduled_date TEXT,                         -- YYYY-MM-DD, future only
                scheduled_time TEXT,                         -- HH:MM:SS, future only
                is_recurring INTEGER NOT NULL DEFAULT 0,
                frequency TEXT,                              -- JSON {count, unit, label}
                schedule_history TEXT NOT NULL DEFAULT '[]', -- JSON array of entries
                created_at TEXT NOT NULL,
                requested_schedule TEXT                      -- raw \"date time\" as requested
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_sender
                ON notifications (sender, created_at);
            ",
        )
        .map_err(store_err("Migration"))?;

        // Databases created before requested_schedule existed.
        let has_requested = conn
            .prepare("SELECT 1 FROM pragma_table_info('notifications') WHERE name = 'requested_schedule'")
            .and_then(|mut stmt| stmt.exists([]))
            .map_err(store_err("Migration"))?;
        if !has_requested {
            conn.execute_batch("ALTER TABLE notifications ADD COLUMN requested_schedule TEXT;")
                .map_err(store_err("Migration"))?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| NotifyError::Store(format!("Lock: {e}")))
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<Notification>> {
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM notifications WHERE id = ?1"),
                [id],
                RawRow::from_row,
            )
            .optional()
            .map_err(store_err("Find notification"))?;
        raw.map(RawRow::into_notification).transpose()
    }

    /// Read-modify-write of the schedule history under the connection lock.
    fn update_history<F>(&self, id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<ScheduleEntry>),
    {
        let conn = self.lock()?;
        let history: Option<String> = conn
            .query_row(
                "SELECT schedule_history FROM notifications WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err("Load schedule"))?;
        let Some(history) = history else {
            return Err(NotifyError::NotFound(format!("notification {id}")));
        };
        let mut entries: Vec<ScheduleEntry> = serde_json::from_str(&history)
            .map_err(|e| NotifyError::Store(format!("notification {id}: bad schedule_history: {e}")))?;
        update(&mut entries);
        let json = serde_json::to_string(&entries)
            .map_err(|e| NotifyError::Store(format!("Serialize schedule: {e}")))?;
        conn.execute(
            "UPDATE notifications SET schedule_history = ?1 WHERE id = ?2",
            params![json, id],
        )
        .map_err(store_err("Update schedule"))?;
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn insert(&self, n: &Notification) -> Result<()> {
        let frequency = n
            .frequency
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| NotifyError::Store(format!("Serialize frequency: {e}")))?;
        let history = serde_json::to_string(&n.schedule_history)
            .map_err(|e| NotifyError::Store(format!("Serialize schedule: {e}")))?;

        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO notifications ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                n.id,
                n.sender_identity,
                n.recipient_identity,
                n.content,
                n.is_future as i32,
                n.scheduled_date.map(|d| d.format("%Y-%m-%d").to_string()),
                n.scheduled_time.map(|t| t.format("%H:%M:%S").to_string()),
                n.is_recurring as i32,
                frequency,
                history,
                ts(&n.created_at),
                n.requested_schedule,
            ],
        )
        .map_err(store_err("Insert notification"))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>> {
        let conn = self.lock()?;
        Self::load(&conn, id)
    }

    async fn find(&self, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        let order = match filter.sort {
            SortOrder::NewestFirst => "DESC",
            SortOrder::OldestFirst => "ASC",
        };
        let mut sql = format!("SELECT {COLUMNS} FROM notifications");
        let mut args: Vec<String> = Vec::new();
        if let Some(sender) = &filter.sender {
            sql.push_str(" WHERE sender = ?1");
            args.push(sender.clone());
        }
        sql.push_str(&format!(" ORDER BY created_at {order}, rowid {order}"));
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(store_err("List notifications"))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), RawRow::from_row)
            .map_err(store_err("List notifications"))?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw.map_err(store_err("Read notification"))?.into_notification()?);
        }
        Ok(out)
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM notifications WHERE id = ?1", [id])
            .map_err(store_err("Delete notification"))?;
        Ok(n > 0)
    }

    async fn record_outcome(
        &self,
        id: &str,
        scheduled_at: DateTime<Utc>,
        priority: Priority,
        status: ScheduleStatus,
    ) -> Result<()> {
        self.update_history(id, |entries| {
            let pending = entries.iter_mut().rev().find(|e| {
                e.status == ScheduleStatus::Pending && e.scheduled_instant == scheduled_at
            });
            match pending {
                Some(entry) => entry.status = status,
                None => entries.push(ScheduleEntry {
                    scheduled_instant: scheduled_at,
                    priority,
                    status,
                }),
            }
        })
    }

    async fn append_schedule(&self, id: &str, entry: ScheduleEntry) -> Result<()> {
        self.update_history(id, |entries| entries.push(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use medinotify_core::FrequencyUnit;

    fn record(sender: &str, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id: Notification::new_id(),
            sender_identity: sender.to_string(),
            recipient_identity: "patient@mail.com".into(),
            content: "Please fast for 8 hours before your procedure".into(),
            is_future: false,
            scheduled_date: None,
            scheduled_time: None,
            requested_schedule: None,
            is_recurring: false,
            frequency: None,
            schedule_history: vec![],
            created_at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let mut n = record("dr.lee@hospital.org", Utc::now());
        n.is_future = true;
        n.scheduled_date = NaiveDate::from_ymd_opt(2025, 6, 1);
        n.scheduled_time = NaiveTime::from_hms_opt(9, 30, 0);
        n.requested_schedule = Some("2025-06-01 09:30".into());
        n.is_recurring = true;
        n.frequency = Some(Frequency {
            count: 2,
            unit: FrequencyUnit::Day,
            label: "Days".into(),
        });
        n.schedule_history
            .push(ScheduleEntry::pending(Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap(), Priority::High));
        store.insert(&n).await.unwrap();

        let loaded = store.find_by_id(&n.id).await.unwrap().unwrap();
        assert_eq!(loaded, n);
        assert_eq!(loaded.frequency.unwrap().label, "Days");
        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let n = record("a@b.com", Utc::now());
        store.insert(&n).await.unwrap();
        assert!(matches!(store.insert(&n).await, Err(NotifyError::Store(_))));
    }

    #[tokio::test]
    async fn test_find_sorted_and_filtered() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let base = Utc::now();
        let oldest = record("nurse@hospital.org", base - Duration::minutes(10));
        let middle = record("billing@hospital.org", base - Duration::minutes(5));
        let newest = record("nurse@hospital.org", base);
        for n in [&middle, &newest, &oldest] {
            store.insert(n).await.unwrap();
        }

        let all = store.find(&NotificationFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec![newest.id.as_str(), middle.id.as_str(), oldest.id.as_str()]);

        let nurse = store.find(&NotificationFilter::by_sender("nurse@hospital.org")).await.unwrap();
        assert_eq!(nurse.len(), 2);
        assert_eq!(nurse[0].id, newest.id);

        let oldest_first = store
            .find(&NotificationFilter {
                sort: SortOrder::OldestFirst,
                limit: Some(1),
                ..NotificationFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(oldest_first.len(), 1);
        assert_eq!(oldest_first[0].id, oldest.id);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let n = record("a@b.com", Utc::now());
        store.insert(&n).await.unwrap();
        assert!(store.delete_by_id(&n.id).await.unwrap());
        assert!(!store.delete_by_id(&n.id).await.unwrap());
        assert!(store.find_by_id(&n.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_outcome_updates_pending_or_appends() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let mut n = record("a@b.com", Utc::now());
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        n.is_future = true;
        n.schedule_history.push(ScheduleEntry::pending(at, Priority::Normal));
        store.insert(&n).await.unwrap();

        store.record_outcome(&n.id, at, Priority::Normal, ScheduleStatus::Sent).await.unwrap();
        let loaded = store.find_by_id(&n.id).await.unwrap().unwrap();
        assert_eq!(loaded.schedule_history.len(), 1);
        assert_eq!(loaded.schedule_history[0].status, ScheduleStatus::Sent);

        // No pending entry for this instant: appended.
        let other = at + Duration::hours(1);
        store.record_outcome(&n.id, other, Priority::Low, ScheduleStatus::Failed).await.unwrap();
        let loaded = store.find_by_id(&n.id).await.unwrap().unwrap();
        assert_eq!(loaded.schedule_history.len(), 2);
        assert_eq!(loaded.schedule_history[1].status, ScheduleStatus::Failed);
        assert_eq!(loaded.schedule_history[1].priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_history_updates_on_missing_record() {
        let store = SqliteNotificationStore::in_memory().unwrap();
        let err = store
            .record_outcome("gone", Utc::now(), Priority::Normal, ScheduleStatus::Sent)
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::NotFound(_)));
        let err = store
            .append_schedule("gone", ScheduleEntry::pending(Utc::now(), Priority::Normal))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_adds_requested_schedule_to_older_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notifications (
                id TEXT PRIMARY KEY, sender TEXT NOT NULL, recipient TEXT NOT NULL,
                content TEXT NOT NULL, is_future INTEGER NOT NULL DEFAULT 0,
                scheduled_date TEXT, scheduled_time TEXT,
                is_recurring INTEGER NOT NULL DEFAULT 0, frequency TEXT,
                schedule_history TEXT NOT NULL DEFAULT '[]', created_at TEXT NOT NULL
            );",
        )
        .unwrap();
        let store = SqliteNotificationStore::with_connection(conn).unwrap();
        store.migrate().unwrap();

        let mut n = record("a@b.com", Utc::now());
        n.is_future = true;
        n.requested_schedule = Some("2025-02-30 09:00".into());
        store.insert(&n).await.unwrap();
        assert_eq!(store.find_by_id(&n.id).await.unwrap().unwrap(), n);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = std::env::temp_dir().join("medinotify-store-test");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("notifications.db");
        {
            let store = SqliteNotificationStore::open(&path).unwrap();
            store.insert(&record("a@b.com", Utc::now())).await.unwrap();
        }
        let reopened = SqliteNotificationStore::open(&path).unwrap();
        assert_eq!(reopened.find(&NotificationFilter::default()).await.unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
