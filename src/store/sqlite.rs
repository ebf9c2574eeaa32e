//! SQLite-backed round store
//!
//! Safe to share between processes: every mutation runs inside a
//! `BEGIN IMMEDIATE` transaction and re-checks the round's state before
//! writing.

use super::{RoundStore, SettlementWrite, StoreError};
use crate::ledger::Bet;
use crate::round::{Direction, Pool, Round, RoundNumber, RoundResult, RoundStatus, Token};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS rounds (
    round_number INTEGER PRIMARY KEY,
    status TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    start_price TEXT,
    end_price TEXT,
    result TEXT,
    revision INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_rounds_status
    ON rounds(status, round_number);

CREATE TABLE IF NOT EXISTS round_pools (
    round_number INTEGER NOT NULL REFERENCES rounds(round_number) ON DELETE CASCADE,
    token TEXT NOT NULL,
    up_pool TEXT NOT NULL,
    down_pool TEXT NOT NULL,
    PRIMARY KEY (round_number, token)
);

CREATE TABLE IF NOT EXISTS bets (
    round_number INTEGER NOT NULL REFERENCES rounds(round_number) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    id TEXT NOT NULL UNIQUE,
    direction TEXT NOT NULL,
    stake TEXT NOT NULL,
    token TEXT NOT NULL,
    placed_at INTEGER NOT NULL,
    settled INTEGER NOT NULL DEFAULT 0,
    payout TEXT,
    PRIMARY KEY (round_number, user_id)
);

CREATE INDEX IF NOT EXISTS idx_bets_user
    ON bets(user_id, round_number DESC);
"#;

const ROUND_COLUMNS: &str =
    "round_number, status, start_time, end_time, start_price, end_price, result, revision";

const BET_COLUMNS: &str =
    "id, round_number, user_id, direction, stake, token, placed_at, settled, payout";

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StoreError::Busy,
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

fn parse<T: FromStr>(column: &str, raw: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Backend(format!("bad {} value {:?}: {}", column, raw, e)))
}

fn parse_opt<T: FromStr>(column: &str, raw: Option<String>) -> Result<Option<T>, StoreError>
where
    T::Err: std::fmt::Display,
{
    raw.map(|s| parse(column, &s)).transpose()
}

/// Raw `rounds` row before decimal/enum parsing
struct RoundRow {
    round_number: i64,
    status: String,
    start_time: i64,
    end_time: i64,
    start_price: Option<String>,
    end_price: Option<String>,
    result: Option<String>,
    revision: i64,
}

impl RoundRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            round_number: row.get(0)?,
            status: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            start_price: row.get(4)?,
            end_price: row.get(5)?,
            result: row.get(6)?,
            revision: row.get(7)?,
        })
    }

    fn into_round(self, pools: BTreeMap<Token, Pool>) -> Result<Round, StoreError> {
        Ok(Round {
            round_number: self.round_number as RoundNumber,
            status: parse("status", &self.status)?,
            start_time: self.start_time,
            end_time: self.end_time,
            start_price: parse_opt("start_price", self.start_price)?,
            end_price: parse_opt("end_price", self.end_price)?,
            result: parse_opt::<RoundResult>("result", self.result)?,
            pools,
            revision: self.revision as u64,
        })
    }
}

/// Raw `bets` row
struct BetRow {
    id: String,
    round_number: i64,
    user_id: String,
    direction: String,
    stake: String,
    token: String,
    placed_at: i64,
    settled: bool,
    payout: Option<String>,
}

impl BetRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            round_number: row.get(1)?,
            user_id: row.get(2)?,
            direction: row.get(3)?,
            stake: row.get(4)?,
            token: row.get(5)?,
            placed_at: row.get(6)?,
            settled: row.get(7)?,
            payout: row.get(8)?,
        })
    }

    fn into_bet(self) -> Result<Bet, StoreError> {
        Ok(Bet {
            id: parse::<Uuid>("id", &self.id)?,
            round_number: self.round_number as RoundNumber,
            user_id: self.user_id,
            direction: parse::<Direction>("direction", &self.direction)?,
            stake: parse::<Decimal>("stake", &self.stake)?,
            token: parse::<Token>("token", &self.token)?,
            placed_at: self.placed_at,
            settled: self.settled,
            payout: parse_opt::<Decimal>("payout", self.payout)?,
        })
    }
}

fn load_pools(
    conn: &Connection,
    round_number: RoundNumber,
) -> Result<BTreeMap<Token, Pool>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT token, up_pool, down_pool FROM round_pools WHERE round_number = ?1",
    )?;
    let rows = stmt
        .query_map(params![round_number as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut pools = BTreeMap::new();
    for (token, up, down) in rows {
        pools.insert(
            parse::<Token>("token", &token)?,
            Pool {
                up: parse("up_pool", &up)?,
                down: parse("down_pool", &down)?,
            },
        );
    }
    Ok(pools)
}

fn load_round(conn: &Connection, round_number: RoundNumber) -> Result<Option<Round>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM rounds WHERE round_number = ?1", ROUND_COLUMNS),
            params![round_number as i64],
            RoundRow::from_row,
        )
        .optional()?;

    match row {
        Some(row) => {
            let pools = load_pools(conn, round_number)?;
            row.into_round(pools).map(Some)
        }
        None => Ok(None),
    }
}

fn query_rounds(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Round>, StoreError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(args, RoundRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|row| {
            let pools = load_pools(conn, row.round_number as RoundNumber)?;
            row.into_round(pools)
        })
        .collect()
}

fn query_bets(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Bet>, StoreError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(args, BetRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(BetRow::into_bet).collect()
}

/// Round store persisted to a SQLite database file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::init(conn, &path.display().to_string())
    }

    /// Private in-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)?;

        let rounds: i64 = conn.query_row("SELECT COUNT(*) FROM rounds", [], |row| row.get(0))?;
        tracing::info!(db = label, rounds, "Round store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl RoundStore for SqliteStore {
    async fn insert_round(&self, round: &Round) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO rounds (round_number, status, start_time, end_time, revision)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                round.round_number as i64,
                round.status.as_str(),
                round.start_time,
                round.end_time,
                round.revision as i64,
            ],
        )?;
        Ok(inserted == 1)
    }

    async fn get_round(&self, round_number: RoundNumber) -> Result<Option<Round>, StoreError> {
        load_round(&self.conn.lock(), round_number)
    }

    async fn rounds_in_range(
        &self,
        from: RoundNumber,
        to: RoundNumber,
    ) -> Result<Vec<Round>, StoreError> {
        query_rounds(
            &self.conn.lock(),
            &format!(
                "SELECT {} FROM rounds WHERE round_number >= ?1 AND round_number < ?2
                 ORDER BY round_number ASC",
                ROUND_COLUMNS
            ),
            params![from as i64, to as i64],
        )
    }

    async fn unsettled_before(&self, before: RoundNumber) -> Result<Vec<Round>, StoreError> {
        query_rounds(
            &self.conn.lock(),
            &format!(
                "SELECT {} FROM rounds WHERE round_number < ?1 AND status != 'settled'
                 ORDER BY round_number ASC",
                ROUND_COLUMNS
            ),
            params![before as i64],
        )
    }

    async fn recent_settled(&self, limit: usize) -> Result<Vec<Round>, StoreError> {
        query_rounds(
            &self.conn.lock(),
            &format!(
                "SELECT {} FROM rounds WHERE status = 'settled'
                 ORDER BY round_number DESC LIMIT ?1",
                ROUND_COLUMNS
            ),
            params![limit as i64],
        )
    }

    async fn latest_round_number(&self) -> Result<Option<RoundNumber>, StoreError> {
        let conn = self.conn.lock();
        let latest: Option<i64> =
            conn.query_row("SELECT MAX(round_number) FROM rounds", [], |row| row.get(0))?;
        Ok(latest.map(|n| n as RoundNumber))
    }

    async fn open_round(
        &self,
        round_number: RoundNumber,
        start_price: Decimal,
    ) -> Result<Round, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE rounds SET status = 'live', start_price = ?2, revision = revision + 1
             WHERE round_number = ?1 AND status = 'scheduled' AND start_price IS NULL",
            params![round_number as i64, start_price.to_string()],
        )?;

        if updated == 0 {
            let current = load_round(&tx, round_number)?;
            return Err(match current {
                None => StoreError::RoundNotFound(round_number),
                Some(round) => StoreError::Conflict {
                    round_number,
                    reason: format!("cannot open a {} round", round.status.as_str()),
                },
            });
        }

        let round = load_round(&tx, round_number)?.ok_or(StoreError::RoundNotFound(round_number))?;
        tx.commit()?;
        Ok(round)
    }

    async fn commit_bet(&self, bet: &Bet) -> Result<Round, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let round = load_round(&tx, bet.round_number)?
            .ok_or(StoreError::RoundNotFound(bet.round_number))?;
        if !round.accepts_bets_at(bet.placed_at) {
            return Err(StoreError::Conflict {
                round_number: bet.round_number,
                reason: "round is not accepting bets".to_string(),
            });
        }

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM bets WHERE round_number = ?1 AND user_id = ?2)",
            params![bet.round_number as i64, bet.user_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StoreError::DuplicateBet {
                round_number: bet.round_number,
                user_id: bet.user_id.clone(),
            });
        }

        tx.execute(
            &format!(
                "INSERT INTO bets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL)",
                BET_COLUMNS
            ),
            params![
                bet.id.to_string(),
                bet.round_number as i64,
                bet.user_id,
                bet.direction.as_str(),
                bet.stake.to_string(),
                bet.token.as_str(),
                bet.placed_at,
            ],
        )?;

        let mut pool = round.pool(bet.token);
        pool.add(bet.direction, bet.stake);
        tx.execute(
            "INSERT INTO round_pools (round_number, token, up_pool, down_pool)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(round_number, token)
             DO UPDATE SET up_pool = excluded.up_pool, down_pool = excluded.down_pool",
            params![
                bet.round_number as i64,
                bet.token.as_str(),
                pool.up.to_string(),
                pool.down.to_string(),
            ],
        )?;
        tx.execute(
            "UPDATE rounds SET revision = revision + 1 WHERE round_number = ?1",
            params![bet.round_number as i64],
        )?;

        let round =
            load_round(&tx, bet.round_number)?.ok_or(StoreError::RoundNotFound(bet.round_number))?;
        tx.commit()?;
        Ok(round)
    }

    async fn get_bet(
        &self,
        round_number: RoundNumber,
        user_id: &str,
    ) -> Result<Option<Bet>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM bets WHERE round_number = ?1 AND user_id = ?2",
                    BET_COLUMNS
                ),
                params![round_number as i64, user_id],
                BetRow::from_row,
            )
            .optional()?;
        row.map(BetRow::into_bet).transpose()
    }

    async fn bets_for_round(&self, round_number: RoundNumber) -> Result<Vec<Bet>, StoreError> {
        query_bets(
            &self.conn.lock(),
            &format!(
                "SELECT {} FROM bets WHERE round_number = ?1 ORDER BY placed_at ASC, rowid ASC",
                BET_COLUMNS
            ),
            params![round_number as i64],
        )
    }

    async fn bets_for_user(&self, user_id: &str) -> Result<Vec<Bet>, StoreError> {
        query_bets(
            &self.conn.lock(),
            &format!(
                "SELECT {} FROM bets WHERE user_id = ?1 ORDER BY round_number DESC",
                BET_COLUMNS
            ),
            params![user_id],
        )
    }

    async fn settle_round(&self, write: &SettlementWrite) -> Result<Round, StoreError> {
        let round_number = write.round_number;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let round = load_round(&tx, round_number)?.ok_or(StoreError::RoundNotFound(round_number))?;
        if round.status != RoundStatus::Live {
            return Err(StoreError::Conflict {
                round_number,
                reason: format!("cannot settle a {} round", round.status.as_str()),
            });
        }
        if round.revision != write.expected_revision {
            return Err(StoreError::Conflict {
                round_number,
                reason: format!(
                    "revision moved from {} to {}",
                    write.expected_revision, round.revision
                ),
            });
        }

        let bet_ids: Vec<String> = {
            let mut stmt = tx.prepare_cached("SELECT id FROM bets WHERE round_number = ?1")?;
            let ids = stmt
                .query_map(params![round_number as i64], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };
        let payouts: HashMap<String, Decimal> = write
            .payouts
            .iter()
            .map(|(id, payout)| (id.to_string(), *payout))
            .collect();
        if bet_ids.len() != payouts.len() || !bet_ids.iter().all(|id| payouts.contains_key(id)) {
            return Err(StoreError::Conflict {
                round_number,
                reason: format!(
                    "payouts cover {} entries for {} bets",
                    payouts.len(),
                    bet_ids.len()
                ),
            });
        }

        {
            let mut stmt = tx.prepare_cached(
                "UPDATE bets SET settled = 1, payout = ?2 WHERE id = ?1 AND settled = 0",
            )?;
            for (id, payout) in &payouts {
                stmt.execute(params![id, payout.to_string()])?;
            }
        }

        tx.execute(
            "UPDATE rounds SET status = 'settled', end_price = ?2, result = ?3,
                 revision = revision + 1
             WHERE round_number = ?1",
            params![
                round_number as i64,
                write.end_price.to_string(),
                write.result.as_str(),
            ],
        )?;

        let round = load_round(&tx, round_number)?.ok_or(StoreError::RoundNotFound(round_number))?;
        tx.commit()?;
        Ok(round)
    }

    async fn prune_settled(&self, keep: usize) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let doomed: Vec<i64> = {
            let mut stmt = tx.prepare_cached(
                "SELECT round_number FROM rounds WHERE status = 'settled'
                 ORDER BY round_number DESC LIMIT -1 OFFSET ?1",
            )?;
            let rows = stmt
                .query_map(params![keep as i64], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        for n in &doomed {
            tx.execute("DELETE FROM bets WHERE round_number = ?1", params![n])?;
            tx.execute("DELETE FROM round_pools WHERE round_number = ?1", params![n])?;
            tx.execute("DELETE FROM rounds WHERE round_number = ?1", params![n])?;
        }

        tx.commit()?;
        Ok(doomed.len())
    }
}
