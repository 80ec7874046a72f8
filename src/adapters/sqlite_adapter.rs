//! SQLite data adapter.
//!
//! Mirrors the production table shapes closely enough for local work and
//! tests. Timestamps are fixed-width RFC 3339 UTC text, so string order is
//! time order; dates are `YYYY-MM-DD`.

use crate::domain::cot::{CotDateRange, CotReport, TraderPositions};
use crate::domain::error::SticklabError;
use crate::domain::iv_rank::IvPoint;
use crate::domain::stick::{Interval, StickQuery};
use crate::domain::stock_metadata::{MetadataStatus, StockMetadata};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{CotPort, OptionsPort, StickPort, SymbolPort};
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DATE_FORMAT: &str = "%Y-%m-%d";

const COT_COLUMNS: &str = "asset, report_date, as_of_date, open_interest, delta_open_interest, \
    asset_mgr_long, asset_mgr_short, asset_mgr_delta_long, asset_mgr_delta_short, \
    asset_mgr_long_pct, asset_mgr_short_pct, asset_mgr_net, \
    dealer_long, dealer_short, dealer_delta_long, dealer_delta_short, \
    dealer_long_pct, dealer_short_pct, dealer_net, \
    lev_money_long, lev_money_short, lev_money_delta_long, lev_money_delta_short, \
    lev_money_long_pct, lev_money_short_pct, lev_money_net, \
    other_rept_long, other_rept_short, other_rept_delta_long, other_rept_delta_short, \
    other_rept_long_pct, other_rept_short_pct, other_rept_net, \
    ingest_ts";

const COT_COLUMN_COUNT: usize = 34;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> SticklabError {
    SticklabError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> SticklabError {
    SticklabError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn conversion_err(text: &str, e: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(text.len(), rusqlite::types::Type::Text, Box::new(e))
}

fn parse_ts(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_err(text, e))
}

fn parse_date(text: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|e| conversion_err(text, e))
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SticklabError> {
        let db_path = config.require_string("sqlite", "path")?;
        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        tracing::debug!(path = %db_path, pool_size, "opened sqlite pool");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SticklabError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SticklabError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), SticklabError> {
        let cot_table = format!(
            "CREATE TABLE IF NOT EXISTS cot_data_all (
                asset TEXT NOT NULL,
                report_date TEXT NOT NULL,
                as_of_date TEXT NOT NULL,
                open_interest INTEGER NOT NULL,
                delta_open_interest INTEGER NOT NULL,
                {groups}
                ingest_ts TEXT,
                PRIMARY KEY (asset, report_date)
            );",
            groups = ["asset_mgr", "dealer", "lev_money", "other_rept"]
                .iter()
                .map(|g| {
                    format!(
                        "{g}_long INTEGER NOT NULL, {g}_short INTEGER NOT NULL, \
                         {g}_delta_long INTEGER NOT NULL, {g}_delta_short INTEGER NOT NULL, \
                         {g}_long_pct REAL NOT NULL, {g}_short_pct REAL NOT NULL, \
                         {g}_net INTEGER NOT NULL,"
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        );

        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stick (
                symbol TEXT NOT NULL,
                interval INTEGER NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                compressed_sticks BLOB NOT NULL,
                PRIMARY KEY (symbol, interval, start_date)
            );
            CREATE TABLE IF NOT EXISTS options_prices (
                symbol TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                strike REAL NOT NULL,
                underlying_price REAL NOT NULL,
                implied_vol REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_options_symbol ON options_prices(symbol);
            CREATE TABLE IF NOT EXISTS hot_stocks (
                symbol TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS stock_metadata (
                symbol TEXT PRIMARY KEY,
                status TEXT,
                last_stick_datetime TEXT,
                dollar_volume REAL,
                avg_volume_30d REAL,
                close_price REAL,
                updated_at TEXT
            );",
        )
        .map_err(query_err)?;
        conn.execute_batch(&cot_table).map_err(query_err)?;

        Ok(())
    }

    pub fn insert_stick_bucket(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        payload: &[u8],
    ) -> Result<(), SticklabError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO stick (symbol, interval, start_date, end_date, compressed_sticks)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![symbol, interval, format_ts(start), format_ts(end), payload],
            )
            .map_err(query_err)?;
        Ok(())
    }

    pub fn insert_option_quote(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        strike: f64,
        underlying_price: f64,
        implied_vol: f64,
    ) -> Result<(), SticklabError> {
        self.conn()?
            .execute(
                "INSERT INTO options_prices (symbol, timestamp, strike, underlying_price, implied_vol)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![symbol, format_ts(timestamp), strike, underlying_price, implied_vol],
            )
            .map_err(query_err)?;
        Ok(())
    }

    pub fn insert_cot_report(&self, report: &CotReport) -> Result<(), SticklabError> {
        let mut values = vec![
            Value::Text(report.asset.clone()),
            Value::Text(report.report_date.format(DATE_FORMAT).to_string()),
            Value::Text(report.as_of_date.format(DATE_FORMAT).to_string()),
            Value::Integer(report.open_interest),
            Value::Integer(report.delta_open_interest),
        ];
        for group in [
            &report.asset_mgr,
            &report.dealer,
            &report.lev_money,
            &report.other_rept,
        ] {
            values.extend([
                Value::Integer(group.long),
                Value::Integer(group.short),
                Value::Integer(group.delta_long),
                Value::Integer(group.delta_short),
                Value::Real(group.long_pct),
                Value::Real(group.short_pct),
                Value::Integer(group.net),
            ]);
        }
        values.push(report.ingest_ts.map_or(Value::Null, |ts| Value::Text(format_ts(ts))));

        let placeholders = vec!["?"; COT_COLUMN_COUNT].join(", ");
        let sql = format!("INSERT OR REPLACE INTO cot_data_all ({COT_COLUMNS}) VALUES ({placeholders})");
        self.conn()?
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(query_err)?;
        Ok(())
    }

    pub fn insert_hot_symbol(&self, symbol: &str) -> Result<(), SticklabError> {
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO hot_stocks (symbol) VALUES (?1)",
                params![symbol],
            )
            .map_err(query_err)?;
        Ok(())
    }

    /// Every `stock_metadata` row, by symbol.
    pub fn load_metadata(&self) -> Result<Vec<StockMetadata>, SticklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, status, last_stick_datetime, dollar_volume, avg_volume_30d, close_price
                 FROM stock_metadata ORDER BY symbol",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(1)?;
                let last: Option<String> = row.get(2)?;
                Ok(StockMetadata {
                    symbol: row.get(0)?,
                    status: if status == MetadataStatus::Active.as_str() {
                        MetadataStatus::Active
                    } else {
                        MetadataStatus::Inactive
                    },
                    last_stick_datetime: last.as_deref().map(parse_ts).transpose()?,
                    dollar_volume: row.get(3)?,
                    avg_volume_30d: row.get(4)?,
                    close_price: row.get(5)?,
                })
            })
            .map_err(query_err)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }
}

impl StickPort for SqliteAdapter {
    fn fetch_compressed(&self, query: &StickQuery) -> Result<Vec<Vec<u8>>, SticklabError> {
        let conn = self.conn()?;
        let to = query.window.map(|w| format_ts(w.to));
        let from = query.window.map(|w| format_ts(w.from));
        let limit = query.limit.map_or(-1, |n| n as i64);

        let mut stmt = conn
            .prepare(
                "SELECT compressed_sticks FROM stick
                 WHERE symbol = ?1 AND interval = ?2
                   AND (?3 IS NULL OR start_date <= ?3)
                   AND (?4 IS NULL OR end_date >= ?4)
                 ORDER BY start_date DESC
                 LIMIT ?5",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![query.symbol, query.interval, to, from, limit],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .map_err(query_err)?;

        let payloads = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err)?;
        tracing::debug!(symbol = %query.symbol, buckets = payloads.len(), "fetched stick buckets");
        Ok(payloads)
    }

    fn list_symbols(&self) -> Result<Vec<String>, SticklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM stick ORDER BY symbol")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(query_err)
    }
}

impl OptionsPort for SqliteAdapter {
    fn iv_history(&self, symbol: &str, moneyness: f64) -> Result<Vec<IvPoint>, SticklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT substr(timestamp, 1, 10) AS day, AVG(implied_vol)
                 FROM options_prices
                 WHERE symbol = ?1
                   AND implied_vol > 0
                   AND underlying_price > 0
                   AND ABS(strike - underlying_price) / underlying_price < ?2
                 GROUP BY day
                 ORDER BY day",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![symbol, moneyness], |row| {
                let day: String = row.get(0)?;
                Ok(IvPoint {
                    date: parse_date(&day)?,
                    avg_iv: row.get(1)?,
                })
            })
            .map_err(query_err)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }
}

fn positions_at(row: &rusqlite::Row<'_>, start: usize) -> rusqlite::Result<TraderPositions> {
    Ok(TraderPositions {
        long: row.get(start)?,
        short: row.get(start + 1)?,
        delta_long: row.get(start + 2)?,
        delta_short: row.get(start + 3)?,
        long_pct: row.get(start + 4)?,
        short_pct: row.get(start + 5)?,
        net: row.get(start + 6)?,
    })
}

fn cot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CotReport> {
    let report_date: String = row.get(1)?;
    let as_of_date: String = row.get(2)?;
    let ingest_ts: Option<String> = row.get(33)?;
    Ok(CotReport {
        asset: row.get(0)?,
        report_date: parse_date(&report_date)?,
        as_of_date: parse_date(&as_of_date)?,
        open_interest: row.get(3)?,
        delta_open_interest: row.get(4)?,
        asset_mgr: positions_at(row, 5)?,
        dealer: positions_at(row, 12)?,
        lev_money: positions_at(row, 19)?,
        other_rept: positions_at(row, 26)?,
        ingest_ts: ingest_ts.as_deref().map(parse_ts).transpose()?,
    })
}

impl CotPort for SqliteAdapter {
    fn cot_reports(
        &self,
        assets: &[String],
        since: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<CotReport>, SticklabError> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; assets.len()].join(", ");
        let sql = format!(
            "SELECT {COT_COLUMNS} FROM cot_data_all
             WHERE asset IN ({placeholders}) AND report_date >= ?
             ORDER BY report_date DESC, asset
             LIMIT ?"
        );

        let mut values: Vec<Value> = assets.iter().map(|a| Value::Text(a.clone())).collect();
        values.push(Value::Text(since.format(DATE_FORMAT).to_string()));
        values.push(Value::Integer(limit.map_or(-1, |n| n as i64)));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), cot_from_row)
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    fn available_assets(&self) -> Result<Vec<String>, SticklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT asset FROM cot_data_all ORDER BY asset")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(query_err)
    }

    fn date_range(&self) -> Result<Option<CotDateRange>, SticklabError> {
        let (earliest, latest, total): (Option<String>, Option<String>, i64) = self
            .conn()?
            .query_row(
                "SELECT MIN(report_date), MAX(report_date), COUNT(*) FROM cot_data_all",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match (earliest, latest) {
            (Some(earliest), Some(latest)) if total > 0 => Ok(Some(CotDateRange {
                earliest: parse_date(&earliest).map_err(query_err)?,
                latest: parse_date(&latest).map_err(query_err)?,
                total_records: total,
            })),
            _ => Ok(None),
        }
    }
}

impl SymbolPort for SqliteAdapter {
    fn hot_symbols(&self) -> Result<Vec<String>, SticklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol FROM hot_stocks ORDER BY symbol")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(query_err)
    }

    fn upsert_metadata(&self, records: &[StockMetadata]) -> Result<(), SticklabError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let now = format_ts(Utc::now());

        for record in records {
            tx.execute(
                "INSERT INTO stock_metadata (
                    symbol, status, last_stick_datetime, dollar_volume,
                    avg_volume_30d, close_price, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (symbol) DO UPDATE SET
                    status = excluded.status,
                    last_stick_datetime = excluded.last_stick_datetime,
                    dollar_volume = excluded.dollar_volume,
                    avg_volume_30d = excluded.avg_volume_30d,
                    close_price = excluded.close_price,
                    updated_at = excluded.updated_at",
                params![
                    record.symbol,
                    record.status.as_str(),
                    record.last_stick_datetime.map(format_ts),
                    record.dollar_volume,
                    record.avg_volume_30d,
                    record.close_price,
                    now,
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }
}
