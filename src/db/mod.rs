pub mod schema;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const SQLITE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnerRecord {
    pub id: i64,
    pub discord_id: String,
    pub user_name: String,
    pub claim_count: i64,
    pub last_claimed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectibleRecord {
    pub id: i64,
    pub source_id: i64,
    pub url: String,
    pub preview_url: Option<String>,
    pub source: Option<String>,
    pub artist_name: Option<String>,
    pub artist_url: Option<String>,
    pub is_nsfw: bool,
    pub tags: Vec<String>,
}

/// Collectible metadata as received from the image provider.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCollectible {
    pub source_id: i64,
    pub url: String,
    pub preview_url: Option<String>,
    pub source: Option<String>,
    pub artist_name: Option<String>,
    pub artist_url: Option<String>,
    pub is_nsfw: bool,
    pub tags: Vec<String>,
}

/// Result of one claim transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimStatus {
    Claimed { claim_count: i64 },
    AlreadyClaimed { owner_name: String },
    OnCooldown { retry_at: DateTime<Utc> },
    UnknownCollectible,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub discord_id: String,
    pub user_name: String,
    pub claim_count: i64,
}

pub fn format_sqlite_utc(ts: DateTime<Utc>) -> String {
    ts.format(SQLITE_TIME_FORMAT).to_string()
}

pub fn parse_sqlite_utc(ts: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(ts, SQLITE_TIME_FORMAT).ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

fn owner_from_row(row: &Row<'_>) -> rusqlite::Result<OwnerRecord> {
    Ok(OwnerRecord {
        id: row.get(0)?,
        discord_id: row.get(1)?,
        user_name: row.get(2)?,
        claim_count: row.get(3)?,
        last_claimed_at: row.get(4)?,
    })
}

fn collectible_from_row(row: &Row<'_>) -> rusqlite::Result<CollectibleRecord> {
    let tags: String = row.get(8)?;
    Ok(CollectibleRecord {
        id: row.get(0)?,
        source_id: row.get(1)?,
        url: row.get(2)?,
        preview_url: row.get(3)?,
        source: row.get(4)?,
        artist_name: row.get(5)?,
        artist_url: row.get(6)?,
        is_nsfw: row.get(7)?,
        tags: tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
    })
}

const OWNER_COLUMNS: &str = "id, discord_id, user_name, claim_count, last_claimed_at";
const COLLECTIBLE_COLUMNS: &str =
    "id, source_id, url, preview_url, source, artist_name, artist_url, is_nsfw, tags";

impl Database {
    pub fn new(database_url: &str) -> anyhow::Result<Self> {
        if database_url != ":memory:" {
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        let conn = Connection::open(database_url)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::new(":memory:")
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        self.conn().execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Run a blocking database closure off the async runtime.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn upsert_owner(&self, discord_id: &str, user_name: &str) -> anyhow::Result<OwnerRecord> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO owners (discord_id, user_name) VALUES (?1, ?2)
             ON CONFLICT(discord_id) DO UPDATE SET user_name = excluded.user_name",
            (discord_id, user_name),
        )?;
        let owner = conn.query_row(
            &format!("SELECT {OWNER_COLUMNS} FROM owners WHERE discord_id = ?1"),
            [discord_id],
            owner_from_row,
        )?;
        Ok(owner)
    }

    pub fn get_owner(&self, discord_id: &str) -> anyhow::Result<Option<OwnerRecord>> {
        let conn = self.conn();
        let owner = conn
            .query_row(
                &format!("SELECT {OWNER_COLUMNS} FROM owners WHERE discord_id = ?1"),
                [discord_id],
                owner_from_row,
            )
            .optional()?;
        Ok(owner)
    }

    /// Insert or refresh a collectible, returning its row id.
    pub fn upsert_collectible(&self, item: &NewCollectible) -> anyhow::Result<i64> {
        debug!("Database: Upserting collectible {}", item.source_id);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO collectibles
                (source_id, url, preview_url, source, artist_name, artist_url, is_nsfw, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(source_id) DO UPDATE SET
                url = excluded.url,
                preview_url = excluded.preview_url,
                source = excluded.source,
                artist_name = excluded.artist_name,
                artist_url = excluded.artist_url,
                is_nsfw = excluded.is_nsfw,
                tags = excluded.tags",
            rusqlite::params![
                item.source_id,
                item.url,
                item.preview_url,
                item.source,
                item.artist_name,
                item.artist_url,
                item.is_nsfw,
                item.tags.join(","),
            ],
        )?;
        let id = conn.query_row(
            "SELECT id FROM collectibles WHERE source_id = ?1",
            [item.source_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_collectible(&self, source_id: i64) -> anyhow::Result<Option<CollectibleRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!("SELECT {COLLECTIBLE_COLUMNS} FROM collectibles WHERE source_id = ?1"),
                [source_id],
                collectible_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Claim a collectible for a user in one transaction.
    ///
    /// Order of checks: the collectible must exist, must not already be
    /// owned, and the user must be off cooldown. The owner row is upserted
    /// as soon as the collectible is known, even if the attempt then fails.
    /// The UNIQUE constraint on `claims.collectible_id` settles concurrent
    /// attempts.
    pub fn claim(
        &self,
        discord_id: &str,
        user_name: &str,
        source_id: i64,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> anyhow::Result<ClaimStatus> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let collectible_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM collectibles WHERE source_id = ?1",
                [source_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(collectible_id) = collectible_id else {
            return Ok(ClaimStatus::UnknownCollectible);
        };

        tx.execute(
            "INSERT INTO owners (discord_id, user_name) VALUES (?1, ?2)
             ON CONFLICT(discord_id) DO UPDATE SET user_name = excluded.user_name",
            (discord_id, user_name),
        )?;
        let owner = tx.query_row(
            &format!("SELECT {OWNER_COLUMNS} FROM owners WHERE discord_id = ?1"),
            [discord_id],
            owner_from_row,
        )?;

        let current_owner: Option<String> = tx
            .query_row(
                "SELECT o.user_name FROM claims c
                 JOIN owners o ON o.id = c.owner_id
                 WHERE c.collectible_id = ?1",
                [collectible_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(owner_name) = current_owner {
            tx.commit()?;
            return Ok(ClaimStatus::AlreadyClaimed { owner_name });
        }

        if let Some(last) = owner.last_claimed_at.as_deref().and_then(parse_sqlite_utc) {
            let retry_at = last + cooldown;
            if now < retry_at {
                tx.commit()?;
                return Ok(ClaimStatus::OnCooldown { retry_at });
            }
        }

        let claimed_at = format_sqlite_utc(now);
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO claims (owner_id, collectible_id, claimed_at)
             VALUES (?1, ?2, ?3)",
            (owner.id, collectible_id, &claimed_at),
        )?;
        if inserted == 0 {
            tx.commit()?;
            return Ok(ClaimStatus::AlreadyClaimed {
                owner_name: String::new(),
            });
        }

        tx.execute(
            "UPDATE owners SET claim_count = claim_count + 1, last_claimed_at = ?1 WHERE id = ?2",
            (&claimed_at, owner.id),
        )?;
        let claim_count: i64 = tx.query_row(
            "SELECT claim_count FROM owners WHERE id = ?1",
            [owner.id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        debug!(
            "Database: {} claimed collectible {} ({} total)",
            discord_id, source_id, claim_count
        );
        Ok(ClaimStatus::Claimed { claim_count })
    }

    pub fn owner_of(&self, source_id: i64) -> anyhow::Result<Option<OwnerRecord>> {
        let conn = self.conn();
        let owner = conn
            .query_row(
                "SELECT o.id, o.discord_id, o.user_name, o.claim_count, o.last_claimed_at
                 FROM claims c
                 JOIN collectibles k ON k.id = c.collectible_id
                 JOIN owners o ON o.id = c.owner_id
                 WHERE k.source_id = ?1",
                [source_id],
                owner_from_row,
            )
            .optional()?;
        Ok(owner)
    }

    /// A user's claimed collectibles, newest claim first.
    pub fn collection(
        &self,
        discord_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<CollectibleRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT k.id, k.source_id, k.url, k.preview_url, k.source, k.artist_name,
                    k.artist_url, k.is_nsfw, k.tags
             FROM claims c
             JOIN collectibles k ON k.id = c.collectible_id
             JOIN owners o ON o.id = c.owner_id
             WHERE o.discord_id = ?1
             ORDER BY c.claimed_at DESC, c.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map((discord_id, limit as i64), collectible_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn leaderboard(&self, limit: usize) -> anyhow::Result<Vec<LeaderboardEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT discord_id, user_name, claim_count FROM owners
             WHERE claim_count > 0
             ORDER BY claim_count DESC, last_claimed_at ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(LeaderboardEntry {
                discord_id: row.get(0)?,
                user_name: row.get(1)?,
                claim_count: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}
