//! SQLite row cache of platform entities.
//!
//! Users, guilds, channels and members seen on the gateway are kept in a
//! small local database so name lookups do not need an HTTP round trip.
//! Rows are inserted on first sight and updated only when the name changed.

use std::fmt;
use std::fs;
use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug)]
pub enum CacheError {
    NotCached,
    Pool(r2d2::Error),
    Sqlite(rusqlite::Error),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NotCached => write!(f, "entity is not cached"),
            CacheError::Pool(err) => write!(f, "cache pool error: {}", err),
            CacheError::Sqlite(err) => write!(f, "cache sqlite error: {}", err),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<r2d2::Error> for CacheError {
    fn from(value: r2d2::Error) -> Self {
        CacheError::Pool(value)
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(value: rusqlite::Error) -> Self {
        CacheError::Sqlite(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CachedUser {
    pub user_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CachedGuild {
    pub guild_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CachedChannel {
    pub channel_id: String,
    pub name: String,
    pub kind: String,
    pub guild_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CachedMember {
    pub guild_id: String,
    pub user_id: String,
    pub nick: Option<String>,
}

#[derive(Clone)]
pub struct Cache {
    pool: DbPool,
}

impl Cache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let manager = SqliteConnectionManager::file(path);
        Self::with_manager(manager, None)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, CacheError> {
        // A pool of in-memory connections would be a pool of separate
        // databases, so cap it at one.
        Self::with_manager(SqliteConnectionManager::memory(), Some(1))
    }

    fn with_manager(
        manager: SqliteConnectionManager,
        max_size: Option<u32>,
    ) -> Result<Self, CacheError> {
        let mut builder = Pool::builder();
        if let Some(max_size) = max_size {
            builder = builder.max_size(max_size);
        }
        let pool = builder.build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user (
                user_id TEXT(64) PRIMARY KEY UNIQUE NOT NULL,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS guild (
                guild_id TEXT(64) PRIMARY KEY UNIQUE NOT NULL,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS channel (
                channel_id TEXT(64) PRIMARY KEY UNIQUE NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                guild_id TEXT(64),
                user_id TEXT(64)
            );
            CREATE TABLE IF NOT EXISTS guild_member (
                guild_id TEXT(64) NOT NULL,
                user_id TEXT(64) NOT NULL,
                nick TEXT,
                PRIMARY KEY (guild_id, user_id)
            );",
        )?;

        Ok(Self { pool })
    }

    /// Shared handle to the underlying database, for the plopkoek ledger.
    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }

    // The lookup-before-write in each update runs on the connection already
    // checked out for the write; a second checkout would starve a busy pool.

    fn query_user(conn: &Connection, user_id: &str) -> Result<Option<CachedUser>, CacheError> {
        let row = conn
            .query_row(
                "SELECT user_id, name FROM user WHERE user_id=?1",
                params![user_id],
                |row| {
                    Ok(CachedUser {
                        user_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn update_user(&self, user_id: &str, name: &str) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        match Self::query_user(&conn, user_id)? {
            None => {
                conn.execute(
                    "INSERT INTO user (user_id, name) VALUES (?1, ?2)",
                    params![user_id, name],
                )?;
            }
            Some(cached) => {
                if cached.name != name {
                    conn.execute(
                        "UPDATE user SET name=?1 WHERE user_id=?2",
                        params![name, user_id],
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<CachedUser, CacheError> {
        let conn = self.pool.get()?;
        Self::query_user(&conn, user_id)?.ok_or(CacheError::NotCached)
    }

    fn query_guild(conn: &Connection, guild_id: &str) -> Result<Option<CachedGuild>, CacheError> {
        let row = conn
            .query_row(
                "SELECT guild_id, name FROM guild WHERE guild_id=?1",
                params![guild_id],
                |row| {
                    Ok(CachedGuild {
                        guild_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn update_guild(&self, guild_id: &str, name: &str) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        match Self::query_guild(&conn, guild_id)? {
            None => {
                conn.execute(
                    "INSERT INTO guild (guild_id, name) VALUES (?1, ?2)",
                    params![guild_id, name],
                )?;
            }
            Some(cached) => {
                if cached.name != name {
                    conn.execute(
                        "UPDATE guild SET name=?1 WHERE guild_id=?2",
                        params![name, guild_id],
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn get_guild(&self, guild_id: &str) -> Result<CachedGuild, CacheError> {
        let conn = self.pool.get()?;
        Self::query_guild(&conn, guild_id)?.ok_or(CacheError::NotCached)
    }

    pub fn remove_guild(&self, guild_id: &str) {
        tracing::warn!(guild_id, "guild removal is not implemented");
    }

    fn query_channel(
        conn: &Connection,
        channel_id: &str,
    ) -> Result<Option<CachedChannel>, CacheError> {
        let row = conn
            .query_row(
                "SELECT channel_id, name, kind, guild_id, user_id FROM channel WHERE channel_id=?1",
                params![channel_id],
                |row| {
                    Ok(CachedChannel {
                        channel_id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                        guild_id: row.get(3)?,
                        user_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn update_channel(&self, channel: &CachedChannel) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        match Self::query_channel(&conn, &channel.channel_id)? {
            None => {
                conn.execute(
                    "INSERT INTO channel (channel_id, name, kind, guild_id, user_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        channel.channel_id,
                        channel.name,
                        channel.kind,
                        channel.guild_id,
                        channel.user_id
                    ],
                )?;
            }
            Some(cached) => {
                if cached.name != channel.name {
                    conn.execute(
                        "UPDATE channel SET name=?1 WHERE channel_id=?2",
                        params![channel.name, channel.channel_id],
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn get_channel(&self, channel_id: &str) -> Result<CachedChannel, CacheError> {
        let conn = self.pool.get()?;
        Self::query_channel(&conn, channel_id)?.ok_or(CacheError::NotCached)
    }

    pub fn remove_channel(&self, channel_id: &str) {
        tracing::warn!(channel_id, "channel removal is not implemented");
    }

    fn query_member(
        conn: &Connection,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<CachedMember>, CacheError> {
        let row = conn
            .query_row(
                "SELECT guild_id, user_id, nick FROM guild_member WHERE guild_id=?1 AND user_id=?2",
                params![guild_id, user_id],
                |row| {
                    Ok(CachedMember {
                        guild_id: row.get(0)?,
                        user_id: row.get(1)?,
                        nick: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn update_member(
        &self,
        guild_id: &str,
        user_id: &str,
        nick: Option<&str>,
    ) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        match Self::query_member(&conn, guild_id, user_id)? {
            None => {
                conn.execute(
                    "INSERT INTO guild_member (guild_id, user_id, nick) VALUES (?1, ?2, ?3)",
                    params![guild_id, user_id, nick],
                )?;
            }
            Some(cached) => {
                if cached.nick.as_deref() != nick {
                    conn.execute(
                        "UPDATE guild_member SET nick=?1 WHERE guild_id=?2 AND user_id=?3",
                        params![nick, guild_id, user_id],
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn get_member(&self, guild_id: &str, user_id: &str) -> Result<CachedMember, CacheError> {
        let conn = self.pool.get()?;
        Self::query_member(&conn, guild_id, user_id)?.ok_or(CacheError::NotCached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncached_user_is_not_cached() {
        let cache = Cache::open_in_memory().unwrap();
        assert!(matches!(cache.get_user("1"), Err(CacheError::NotCached)));
    }

    #[test]
    fn user_insert_then_update_on_change() {
        let cache = Cache::open_in_memory().unwrap();
        cache.update_user("1", "darragh").unwrap();
        assert_eq!(cache.get_user("1").unwrap().name, "darragh");

        // same name is a no-op, new name replaces
        cache.update_user("1", "darragh").unwrap();
        cache.update_user("1", "egon").unwrap();
        assert_eq!(cache.get_user("1").unwrap().name, "egon");
    }

    // The test pool has exactly one connection, so an update that checked
    // out a second one for its lookup would time out instead of finishing.
    #[test]
    fn update_finishes_on_a_single_connection_pool() {
        let cache = Cache::open_in_memory().unwrap();
        let started = std::time::Instant::now();
        cache.update_user("1", "darragh").unwrap();
        cache.update_user("1", "egon").unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn guild_and_channel_roundtrip() {
        let cache = Cache::open_in_memory().unwrap();
        cache.update_guild("10", "plopland").unwrap();
        assert_eq!(cache.get_guild("10").unwrap().name, "plopland");

        let channel = CachedChannel {
            channel_id: "20".to_string(),
            name: "general".to_string(),
            kind: "text".to_string(),
            guild_id: Some("10".to_string()),
            user_id: None,
        };
        cache.update_channel(&channel).unwrap();
        assert_eq!(cache.get_channel("20").unwrap(), channel);
    }

    #[test]
    fn member_nick_update() {
        let cache = Cache::open_in_memory().unwrap();
        cache.update_member("10", "1", None).unwrap();
        assert_eq!(cache.get_member("10", "1").unwrap().nick, None);
        cache.update_member("10", "1", Some("plopmeester")).unwrap();
        assert_eq!(
            cache.get_member("10", "1").unwrap().nick.as_deref(),
            Some("plopmeester")
        );
    }
}
