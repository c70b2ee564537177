//! The plopkoek transfer ledger.
//!
//! Every donation is one row; income, the daily donor allowance and the
//! leaderboards are all derived from the rows rather than kept as counters.

use chrono::Utc;
use rusqlite::params;

use crate::cache::{CacheError, DbPool};

pub const DONATIONS_PER_DAY: i64 = 5;

const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Calendar period an income query is scoped to.
#[derive(Clone, Copy, Debug)]
pub enum Period {
    Day,
    Month,
}

impl Period {
    fn strftime(self) -> &'static str {
        match self {
            Period::Day => "%Y-%m-%d",
            Period::Month => "%Y-%m",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankingRow {
    pub user_id: String,
    pub received: i64,
    pub donated: i64,
}

#[derive(Clone)]
pub struct Ledger {
    pool: DbPool,
}

impl Ledger {
    pub fn new(pool: DbPool) -> Result<Self, CacheError> {
        let conn = pool.get()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS plopkoek_transfer(
                user_from_id TEXT(64) NOT NULL,
                user_to_id TEXT(64) NOT NULL,
                channel_id TEXT(64) NOT NULL,
                message_id TEXT(64) NOT NULL,
                dt TIMESTAMP NOT NULL,
                FOREIGN KEY(user_from_id) REFERENCES user(user_id),
                FOREIGN KEY(user_to_id) REFERENCES user(user_id))",
            [],
        )?;
        drop(conn);
        Ok(Self { pool })
    }

    pub fn insert(
        &self,
        donator_id: &str,
        receiver_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO plopkoek_transfer(user_from_id, user_to_id, channel_id, message_id, dt)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                donator_id,
                receiver_id,
                channel_id,
                message_id,
                Utc::now().format(DT_FORMAT).to_string()
            ],
        )?;
        Ok(())
    }

    pub fn delete(
        &self,
        donator_id: &str,
        receiver_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), CacheError> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM plopkoek_transfer
             WHERE user_to_id=?1 AND user_from_id=?2 AND channel_id=?3 AND message_id=?4",
            params![receiver_id, donator_id, channel_id, message_id],
        )?;
        Ok(())
    }

    pub fn has_donated(
        &self,
        donator_id: &str,
        receiver_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<bool, CacheError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM plopkoek_transfer
             WHERE user_to_id=?1 AND user_from_id=?2 AND channel_id=?3 AND message_id=?4",
            params![receiver_id, donator_id, channel_id, message_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Plopkoeks received by `user_id` in the current calendar period.
    pub fn income(&self, user_id: &str, period: Period) -> Result<i64, CacheError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM plopkoek_transfer
             WHERE strftime(?1, datetime(dt)) == strftime(?1, 'now') AND user_to_id == ?2",
            params![period.strftime(), user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn total_income(&self, user_id: &str) -> Result<i64, CacheError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM plopkoek_transfer WHERE user_to_id == ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn donations_left(&self, user_id: &str) -> Result<i64, CacheError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM plopkoek_transfer
             WHERE date(dt) == date('now') AND user_from_id==?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(DONATIONS_PER_DAY - count)
    }

    /// Ranking for one calendar month. `month` is zero-padded on the way in,
    /// missing parts default to the current month/year.
    pub fn month_ranking(
        &self,
        month: Option<&str>,
        year: Option<&str>,
    ) -> Result<Vec<RankingRow>, CacheError> {
        let now = Utc::now();
        let mut month = month
            .map(|month| month.to_string())
            .unwrap_or_else(|| now.format("%m").to_string());
        if month.len() == 1 {
            month = format!("0{}", month);
        }
        let year = year
            .map(|year| year.to_string())
            .unwrap_or_else(|| now.format("%Y").to_string());

        let conn = self.pool.get()?;
        let mut received_stmt = conn.prepare(
            "SELECT user_to_id, COUNT(user_to_id) AS received
             FROM plopkoek_transfer
             WHERE strftime('%m', datetime(dt)) == ?1 AND strftime('%Y', datetime(dt)) == ?2
             GROUP BY user_to_id",
        )?;
        let received = received_stmt
            .query_map(params![month, year], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut donated_stmt = conn.prepare(
            "SELECT user_from_id, COUNT(user_from_id) AS donated
             FROM plopkoek_transfer
             WHERE strftime('%m', datetime(dt)) == ?1 AND strftime('%Y', datetime(dt)) == ?2
             GROUP BY user_from_id",
        )?;
        let donated = donated_stmt
            .query_map(params![month, year], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(merge_ranking(received, donated))
    }

    pub fn alltime_ranking(&self) -> Result<Vec<RankingRow>, CacheError> {
        let conn = self.pool.get()?;
        let mut received_stmt = conn.prepare(
            "SELECT user_to_id, COUNT(user_to_id) AS received
             FROM plopkoek_transfer GROUP BY user_to_id",
        )?;
        let received = received_stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut donated_stmt = conn.prepare(
            "SELECT user_from_id, COUNT(user_from_id) AS donated
             FROM plopkoek_transfer GROUP BY user_from_id",
        )?;
        let donated = donated_stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(merge_ranking(received, donated))
    }
}

/// Join the received and donated counts per user, sorted by received
/// descending.
fn merge_ranking(received: Vec<(String, i64)>, donated: Vec<(String, i64)>) -> Vec<RankingRow> {
    let mut rows: Vec<RankingRow> = received
        .into_iter()
        .map(|(user_id, received)| RankingRow {
            user_id,
            received,
            donated: 0,
        })
        .collect();

    for (user_id, count) in donated {
        match rows.iter_mut().find(|row| row.user_id == user_id) {
            Some(row) => row.donated = count,
            None => rows.push(RankingRow {
                user_id,
                received: 0,
                donated: count,
            }),
        }
    }

    rows.sort_by(|a, b| b.received.cmp(&a.received));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;

    fn ledger() -> Ledger {
        let cache = Cache::open_in_memory().unwrap();
        Ledger::new(cache.pool()).unwrap()
    }

    #[test]
    fn insert_shows_up_as_income() {
        let ledger = ledger();
        ledger.insert("1", "2", "30", "40").unwrap();
        assert_eq!(ledger.income("2", Period::Month).unwrap(), 1);
        assert_eq!(ledger.income("2", Period::Day).unwrap(), 1);
        assert_eq!(ledger.total_income("2").unwrap(), 1);
        assert_eq!(ledger.income("1", Period::Month).unwrap(), 0);
    }

    #[test]
    fn donations_left_counts_down_from_five() {
        let ledger = ledger();
        assert_eq!(ledger.donations_left("1").unwrap(), 5);
        for message_id in 0..3 {
            ledger
                .insert("1", "2", "30", &message_id.to_string())
                .unwrap();
        }
        assert_eq!(ledger.donations_left("1").unwrap(), 2);
    }

    #[test]
    fn has_donated_matches_the_exact_transfer() {
        let ledger = ledger();
        ledger.insert("1", "2", "30", "40").unwrap();
        assert!(ledger.has_donated("1", "2", "30", "40").unwrap());
        assert!(!ledger.has_donated("1", "2", "30", "41").unwrap());
        assert!(!ledger.has_donated("2", "1", "30", "40").unwrap());
    }

    #[test]
    fn delete_undoes_a_transfer() {
        let ledger = ledger();
        ledger.insert("1", "2", "30", "40").unwrap();
        ledger.delete("1", "2", "30", "40").unwrap();
        assert!(!ledger.has_donated("1", "2", "30", "40").unwrap());
        assert_eq!(ledger.total_income("2").unwrap(), 0);
        assert_eq!(ledger.donations_left("1").unwrap(), 5);
    }

    #[test]
    fn ranking_merges_received_and_donated() {
        let ledger = ledger();
        ledger.insert("1", "2", "30", "40").unwrap();
        ledger.insert("1", "2", "30", "41").unwrap();
        ledger.insert("2", "3", "30", "42").unwrap();

        let rows = ledger.alltime_ranking().unwrap();
        assert_eq!(
            rows,
            vec![
                RankingRow {
                    user_id: "2".to_string(),
                    received: 2,
                    donated: 1,
                },
                RankingRow {
                    user_id: "3".to_string(),
                    received: 1,
                    donated: 0,
                },
                RankingRow {
                    user_id: "1".to_string(),
                    received: 0,
                    donated: 2,
                },
            ]
        );
    }

    #[test]
    fn month_ranking_pads_single_digit_months() {
        let ledger = ledger();
        ledger.insert("1", "2", "30", "40").unwrap();
        // Some other month has no rows.
        let month = if Utc::now().format("%m").to_string() == "01" {
            "2"
        } else {
            "1"
        };
        assert!(ledger.month_ranking(Some(month), None).unwrap().is_empty());
        // The current month has the row.
        assert_eq!(ledger.month_ranking(None, None).unwrap().len(), 2);
    }
}
