//! SQLite persistence for class groups, syllabi, newsletter sign-ups, guest
//! names and room messages.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use shared::course::{ClassGroup, SyllabusData};
use shared::events::{RoomMessage, Sender};
use std::path::Path;
use std::sync::Arc;

/// Handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct CourseStore {
    conn: Arc<Mutex<Connection>>,
}

impl CourseStore {
    /// Open (or create) the database at `path`. `:memory:` gives a private
    /// in-memory database.
    pub fn open(path: &Path) -> Result<Self> {
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS class_groups (
                id TEXT PRIMARY KEY,
                class_code TEXT NOT NULL,
                class_name TEXT NOT NULL,
                university TEXT NOT NULL,
                term TEXT NOT NULL,
                instructor TEXT NOT NULL,
                members TEXT NOT NULL,
                is_public INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS syllabi (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                group_id TEXT,
                data TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS newsletter_subscribers (
                email TEXT PRIMARY KEY COLLATE NOCASE,
                subscribed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS guest_names (
                name TEXT PRIMARY KEY COLLATE NOCASE,
                claimed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                author TEXT NOT NULL,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_room ON messages(room_id, timestamp);",
        )?;
        Ok(())
    }

    // ---- class groups ----

    /// Insert or replace a group. Last write wins.
    pub fn save_group(&self, group: &ClassGroup) -> Result<()> {
        write_group(&self.conn.lock(), group)
    }

    pub fn get_group(&self, id: &str) -> Result<Option<ClassGroup>> {
        read_group(&self.conn.lock(), id)
    }

    /// Public groups in creation order.
    pub fn list_public_groups(&self) -> Result<Vec<ClassGroup>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, class_code, class_name, university, term, instructor, members, is_public, created_at
             FROM class_groups WHERE is_public = 1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], raw_group)?;
        let groups = rows
            .map(|r| r?.into_group())
            .collect::<Result<Vec<_>>>()?;
        Ok(groups)
    }

    /// Add `user_id` to a group's members. Adding an existing member is a
    /// no-op. Returns the updated group, or `None` if it does not exist.
    pub fn add_member(&self, group_id: &str, user_id: &str) -> Result<Option<ClassGroup>> {
        // one lock for the read-modify-write so concurrent joins are not lost
        let conn = self.conn.lock();
        let Some(mut group) = read_group(&conn, group_id)? else {
            return Ok(None);
        };
        if !group.members.iter().any(|m| m == user_id) {
            group.members.push(user_id.to_string());
            write_group(&conn, &group)?;
        }
        Ok(Some(group))
    }

    // ---- syllabi ----

    pub fn save_syllabus(&self, user_id: &str, group_id: Option<&str>, data: &SyllabusData) -> Result<i64> {
        let json = serde_json::to_string(data)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO syllabi (user_id, group_id, data, uploaded_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, group_id, json, stamp(&Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn syllabi_for_user(&self, user_id: &str) -> Result<Vec<SyllabusData>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM syllabi WHERE user_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        let syllabi = rows
            .map(|r| Ok(serde_json::from_str(&r?)?))
            .collect::<Result<Vec<SyllabusData>>>()?;
        Ok(syllabi)
    }

    // ---- newsletter ----

    /// Record a subscription. Returns false when the address was already
    /// subscribed (compared case-insensitively).
    pub fn subscribe(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO newsletter_subscribers (email, subscribed_at) VALUES (?1, ?2)",
            params![email.trim(), stamp(&Utc::now())],
        )?;
        Ok(inserted == 1)
    }

    pub fn subscriber_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM newsletter_subscribers", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ---- guest names ----

    /// Record a guest name as used. Returns false if it was already taken.
    pub fn claim_guest_name(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO guest_names (name, claimed_at) VALUES (?1, ?2)",
            params![name.trim(), stamp(&Utc::now())],
        )?;
        Ok(inserted == 1)
    }

    pub fn guest_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM guest_names ORDER BY claimed_at")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let names = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    // ---- room messages ----

    pub fn save_message(&self, message: &RoomMessage) -> Result<()> {
        if !message.is_valid() {
            bail!("message {} is missing its room, author or text", message.id);
        }
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO messages (id, room_id, sender, author, text, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.room_id,
                message.sender.as_str(),
                message.author,
                message.text,
                stamp(&message.timestamp),
            ],
        )?;
        Ok(())
    }

    /// The newest `limit` messages of a room, oldest first.
    pub fn recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<RoomMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, room_id, sender, author, text, timestamp FROM messages
             WHERE room_id = ?1 ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![room_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, room_id, sender, author, text, timestamp) = row?;
            out.push(RoomMessage {
                id,
                room_id,
                sender: Sender::parse(&sender).ok_or_else(|| anyhow!("unknown sender {}", sender))?,
                author,
                text,
                timestamp: parse_time(&timestamp)?,
            });
        }
        out.reverse();
        Ok(out)
    }
}

fn write_group(conn: &Connection, group: &ClassGroup) -> Result<()> {
    let members = serde_json::to_string(&group.members)?;
    conn.execute(
        "INSERT OR REPLACE INTO class_groups
            (id, class_code, class_name, university, term, instructor, members, is_public, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            group.id,
            group.class_code,
            group.class_name,
            group.university,
            group.term,
            group.instructor,
            members,
            group.is_public,
            stamp(&group.created_at),
        ],
    )?;
    Ok(())
}

fn read_group(conn: &Connection, id: &str) -> Result<Option<ClassGroup>> {
    let row = conn
        .query_row(
            "SELECT id, class_code, class_name, university, term, instructor, members, is_public, created_at
             FROM class_groups WHERE id = ?1",
            params![id],
            raw_group,
        )
        .optional()?;
    row.map(RawGroup::into_group).transpose()
}

struct RawGroup {
    id: String,
    class_code: String,
    class_name: String,
    university: String,
    term: String,
    instructor: String,
    members: String,
    is_public: bool,
    created_at: String,
}

fn raw_group(row: &Row<'_>) -> rusqlite::Result<RawGroup> {
    Ok(RawGroup {
        id: row.get(0)?,
        class_code: row.get(1)?,
        class_name: row.get(2)?,
        university: row.get(3)?,
        term: row.get(4)?,
        instructor: row.get(5)?,
        members: row.get(6)?,
        is_public: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl RawGroup {
    fn into_group(self) -> Result<ClassGroup> {
        Ok(ClassGroup {
            members: serde_json::from_str(&self.members)
                .with_context(|| format!("members of group {}", self.id))?,
            created_at: parse_time(&self.created_at)?,
            id: self.id,
            class_code: self.class_code,
            class_name: self.class_name,
            university: self.university,
            term: self.term,
            instructor: self.instructor,
            is_public: self.is_public,
        })
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn stamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {}", raw))?
        .with_timezone(&Utc))
}
