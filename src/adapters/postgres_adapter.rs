//! PostgreSQL (TimescaleDB) data adapter.

use crate::domain::cot::{CotDateRange, CotReport, TraderPositions};
use crate::domain::error::SticklabError;
use crate::domain::iv_rank::IvPoint;
use crate::domain::stick::StickQuery;
use crate::domain::stock_metadata::StockMetadata;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{CotPort, OptionsPort, StickPort, SymbolPort};
use chrono::{DateTime, NaiveDate, Utc};
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

fn pool_err(e: r2d2::Error) -> SticklabError {
    SticklabError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: postgres::Error) -> SticklabError {
    SticklabError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// `[database] conninfo` if set, otherwise a key/value connection string
/// assembled from `host`, `port`, `name`, `user` and `password`.
pub fn conninfo_from_config(config: &dyn ConfigPort) -> Result<String, SticklabError> {
    if let Some(conninfo) = config.get_string("database", "conninfo") {
        return Ok(conninfo);
    }

    let name = config.get_string("database", "name");
    let user = config.get_string("database", "user");
    let (Some(name), Some(user)) = (name, user) else {
        return Err(SticklabError::ConfigMissing {
            section: "database".into(),
            key: "conninfo".into(),
        });
    };

    let host = config
        .get_string("database", "host")
        .unwrap_or_else(|| "localhost".to_string());
    let port = config.get_int("database", "port", 5432);
    let mut conninfo = format!("host={host} port={port} dbname={name} user={user}");
    if let Some(password) = config.get_string("database", "password") {
        conninfo.push_str(&format!(" password={password}"));
    }
    Ok(conninfo)
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SticklabError> {
        let conninfo = conninfo_from_config(config)?;
        let pg_config: postgres::Config =
            conninfo.parse().map_err(|e: postgres::Error| SticklabError::ConfigInvalid {
                section: "database".into(),
                key: "conninfo".into(),
                reason: e.to_string(),
            })?;
        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;

        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        tracing::debug!(pool_size, "opened postgres pool");
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, SticklabError> {
        self.pool.get().map_err(pool_err)
    }

    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, SticklabError> {
        self.conn()?.query(sql, params).map_err(query_err)
    }
}

impl StickPort for PostgresAdapter {
    fn fetch_compressed(&self, query: &StickQuery) -> Result<Vec<Vec<u8>>, SticklabError> {
        let to: Option<DateTime<Utc>> = query.window.map(|w| w.to);
        let from: Option<DateTime<Utc>> = query.window.map(|w| w.from);
        let limit: Option<i64> = query.limit.map(|n| n as i64);

        let rows = self.query(
            "SELECT compressed_sticks FROM stick
             WHERE symbol = $1 AND interval = $2
               AND ($3::timestamptz IS NULL OR start_date <= $3)
               AND ($4::timestamptz IS NULL OR end_date >= $4)
             ORDER BY start_date DESC
             LIMIT $5",
            &[&query.symbol, &query.interval, &to, &from, &limit],
        )?;

        tracing::debug!(symbol = %query.symbol, buckets = rows.len(), "fetched stick buckets");
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, SticklabError> {
        let rows = self.query("SELECT DISTINCT symbol FROM stick ORDER BY symbol", &[])?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}

impl OptionsPort for PostgresAdapter {
    fn iv_history(&self, symbol: &str, moneyness: f64) -> Result<Vec<IvPoint>, SticklabError> {
        let rows = self.query(
            "SELECT DATE(timestamp) AS date, AVG(implied_vol)::double precision
             FROM options_prices
             WHERE symbol = $1
               AND implied_vol > 0
               AND underlying_price > 0
               AND (ABS(strike - underlying_price) / underlying_price)::double precision < $2
             GROUP BY DATE(timestamp)
             ORDER BY date",
            &[&symbol, &moneyness],
        )?;

        Ok(rows
            .into_iter()
            .map(|row| IvPoint {
                date: row.get(0),
                avg_iv: row.get(1),
            })
            .collect())
    }
}

fn positions_at(row: &Row, start: usize) -> TraderPositions {
    TraderPositions {
        long: row.get(start),
        short: row.get(start + 1),
        delta_long: row.get(start + 2),
        delta_short: row.get(start + 3),
        long_pct: row.get(start + 4),
        short_pct: row.get(start + 5),
        net: row.get(start + 6),
    }
}

fn cot_from_row(row: &Row) -> CotReport {
    CotReport {
        asset: row.get(0),
        report_date: row.get(1),
        as_of_date: row.get(2),
        open_interest: row.get(3),
        delta_open_interest: row.get(4),
        asset_mgr: positions_at(row, 5),
        dealer: positions_at(row, 12),
        lev_money: positions_at(row, 19),
        other_rept: positions_at(row, 26),
        ingest_ts: row.get(33),
    }
}

/// Numeric columns are cast so they map onto `i64` and `f64`.
fn cot_select_list() -> String {
    let mut columns = vec![
        "asset".to_string(),
        "report_date::date".to_string(),
        "as_of_date::date".to_string(),
        "open_interest::bigint".to_string(),
        "delta_open_interest::bigint".to_string(),
    ];
    for group in ["asset_mgr", "dealer", "lev_money", "other_rept"] {
        columns.extend([
            format!("{group}_long::bigint"),
            format!("{group}_short::bigint"),
            format!("{group}_delta_long::bigint"),
            format!("{group}_delta_short::bigint"),
            format!("{group}_long_pct::double precision"),
            format!("{group}_short_pct::double precision"),
            format!("{group}_net::bigint"),
        ]);
    }
    columns.push("ingest_ts".to_string());
    columns.join(", ")
}

impl CotPort for PostgresAdapter {
    fn cot_reports(
        &self,
        assets: &[String],
        since: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<CotReport>, SticklabError> {
        let sql = format!(
            "SELECT {} FROM cot_data_all
             WHERE asset = ANY($1) AND report_date >= $2
             ORDER BY report_date DESC, asset
             LIMIT $3",
            cot_select_list()
        );
        let limit: Option<i64> = limit.map(|n| n as i64);
        let rows = self.query(&sql, &[&assets, &since, &limit])?;
        Ok(rows.iter().map(cot_from_row).collect())
    }

    fn available_assets(&self) -> Result<Vec<String>, SticklabError> {
        let rows = self.query("SELECT DISTINCT asset FROM cot_data_all ORDER BY asset", &[])?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    fn date_range(&self) -> Result<Option<CotDateRange>, SticklabError> {
        let rows = self.query(
            "SELECT MIN(report_date)::date, MAX(report_date)::date, COUNT(*) FROM cot_data_all",
            &[],
        )?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let earliest: Option<NaiveDate> = row.get(0);
        let latest: Option<NaiveDate> = row.get(1);
        let total_records: i64 = row.get(2);
        match (earliest, latest) {
            (Some(earliest), Some(latest)) if total_records > 0 => Ok(Some(CotDateRange {
                earliest,
                latest,
                total_records,
            })),
            _ => Ok(None),
        }
    }
}

impl SymbolPort for PostgresAdapter {
    fn hot_symbols(&self) -> Result<Vec<String>, SticklabError> {
        let rows = self.query("SELECT symbol FROM hot_stocks ORDER BY symbol", &[])?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    fn upsert_metadata(&self, records: &[StockMetadata]) -> Result<(), SticklabError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_err)?;
        let stmt = tx
            .prepare(
                "INSERT INTO stock_metadata (
                    symbol, status, last_stick_datetime, dollar_volume,
                    avg_volume_30d, close_price, updated_at
                 ) VALUES ($1, $2, $3, $4, $5, $6, NOW())
                 ON CONFLICT (symbol) DO UPDATE SET
                    status = EXCLUDED.status,
                    last_stick_datetime = EXCLUDED.last_stick_datetime,
                    dollar_volume = EXCLUDED.dollar_volume,
                    avg_volume_30d = EXCLUDED.avg_volume_30d,
                    close_price = EXCLUDED.close_price,
                    updated_at = NOW()",
            )
            .map_err(query_err)?;

        for record in records {
            tx.execute(
                &stmt,
                &[
                    &record.symbol,
                    &record.status.as_str(),
                    &record.last_stick_datetime,
                    &record.dollar_volume,
                    &record.avg_volume_30d,
                    &record.close_price,
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }
}
