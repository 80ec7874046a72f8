//! CSV report writer and symbol-list reader.

use crate::domain::error::SticklabError;
use crate::domain::indicator::ema::EmaRibbon;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::ClosedTrade;
use crate::domain::signal_backtest::SignalTradeResult;
use crate::domain::stick::Stick;
use crate::domain::td_scan::TdSignal;
use crate::ports::report_port::ReportPort;
use std::fs::File;
use std::path::Path;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn report_err(path: &Path, e: impl std::fmt::Display) -> SticklabError {
    SticklabError::Report {
        reason: format!("{}: {}", path.display(), e),
    }
}

fn open_writer(path: &Path) -> Result<csv::Writer<File>, SticklabError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    csv::Writer::from_path(path).map_err(|e| report_err(path, e))
}

/// Write `header` then every row, flushing at the end.
fn write_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<(), SticklabError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = open_writer(path)?;
    writer
        .write_record(header)
        .map_err(|e| report_err(path, e))?;
    let mut count = 0usize;
    for row in rows {
        writer.write_record(&row).map_err(|e| report_err(path, e))?;
        count += 1;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), rows = count, "wrote report");
    Ok(())
}

fn num(value: f64) -> String {
    value.to_string()
}

impl ReportPort for CsvReportAdapter {
    fn write_sticks(
        &self,
        sticks: &[Stick],
        ribbon: Option<&EmaRibbon>,
        output_path: &Path,
    ) -> Result<(), SticklabError> {
        let mut header = vec![
            "datetime",
            "epoch_utc_ms",
            "ask_open",
            "ask_high",
            "ask_low",
            "ask_close",
            "bid_open",
            "bid_high",
            "bid_low",
            "bid_close",
            "volume",
        ];
        if ribbon.is_some() {
            header.extend(["ema18", "ema50", "ema200"]);
        }

        let rows = sticks.iter().enumerate().map(|(i, s)| {
            let mut row = vec![
                s.datetime.format(DATETIME_FORMAT).to_string(),
                s.epoch_utc_ms.to_string(),
                num(s.ask_open),
                num(s.ask_high),
                num(s.ask_low),
                num(s.ask_close),
                num(s.bid_open),
                num(s.bid_high),
                num(s.bid_low),
                num(s.bid_close),
                num(s.volume),
            ];
            if let Some(values) = ribbon.and_then(|r| r.row(i)) {
                row.extend(values.map(num));
            }
            row
        });
        write_rows(output_path, &header, rows)
    }

    fn write_td_signals(
        &self,
        signals: &[TdSignal],
        output_path: &Path,
    ) -> Result<(), SticklabError> {
        let header = [
            "symbol",
            "date",
            "signal_type",
            "signal_name",
            "close_price",
            "bid_close",
            "ask_close",
            "volume",
            "dollar_volume",
        ];
        let rows = signals.iter().map(|s| {
            vec![
                s.symbol.clone(),
                s.date.format(DATE_FORMAT).to_string(),
                s.signal_type.to_string(),
                s.signal_type.signal_name().to_string(),
                format!("{:.2}", s.close_price),
                format!("{:.2}", s.bid_close),
                format!("{:.2}", s.ask_close),
                format!("{:.0}", s.volume),
                format!("{:.2}", s.dollar_volume),
            ]
        });
        write_rows(output_path, &header, rows)
    }

    fn write_trades(&self, trades: &[ClosedTrade], output_path: &Path) -> Result<(), SticklabError> {
        let header = [
            "symbol",
            "entry_date",
            "exit_date",
            "shares",
            "entry_price",
            "exit_price",
            "pnl",
            "pnl_pct",
            "reason",
        ];
        let rows = trades.iter().map(|t| {
            vec![
                t.symbol.clone(),
                t.entry_date.format(DATE_FORMAT).to_string(),
                t.exit_date.format(DATE_FORMAT).to_string(),
                format!("{:.4}", t.shares),
                format!("{:.4}", t.entry_price),
                format!("{:.4}", t.exit_price),
                format!("{:.2}", t.pnl),
                format!("{:.2}", t.pnl_pct),
                t.reason.to_string(),
            ]
        });
        write_rows(output_path, &header, rows)
    }

    fn write_equity_curve(
        &self,
        curve: &[EquityPoint],
        output_path: &Path,
    ) -> Result<(), SticklabError> {
        let rows = curve.iter().map(|p| {
            vec![
                p.date.format(DATE_FORMAT).to_string(),
                format!("{:.2}", p.equity),
            ]
        });
        write_rows(output_path, &["date", "equity"], rows)
    }

    fn write_signal_results(
        &self,
        results: &[SignalTradeResult],
        output_path: &Path,
    ) -> Result<(), SticklabError> {
        let header = [
            "symbol",
            "status",
            "entry_date",
            "exit_date",
            "entry_price",
            "exit_price",
            "entry_source",
            "exit_source",
            "position_size",
            "pnl",
            "pnl_pct",
            "days_held",
            "exit_reason",
            "error",
        ];
        let rows = results.iter().map(|r| {
            let mut row = vec![r.symbol.clone(), r.status().to_string()];
            match r.trade() {
                Some(t) => row.extend([
                    t.entry_date.format(DATE_FORMAT).to_string(),
                    t.exit_date.format(DATE_FORMAT).to_string(),
                    format!("{:.4}", t.entry_price),
                    format!("{:.4}", t.exit_price),
                    t.entry_source.as_str().to_string(),
                    t.exit_source.as_str().to_string(),
                    format!("{:.4}", t.position_size),
                    format!("{:.2}", t.pnl),
                    format!("{:.2}", t.pnl_pct),
                    t.days_held.to_string(),
                    t.exit_reason.to_string(),
                ]),
                None => row.extend(std::iter::repeat_n(String::new(), 11)),
            }
            row.push(r.error().unwrap_or_default().to_string());
            row
        });
        write_rows(output_path, &header, rows)
    }
}

/// Symbols from the `symbol` column of a CSV file, in file order.
/// Blank cells are skipped.
pub fn read_symbol_list(path: &Path) -> Result<Vec<String>, SticklabError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| report_err(path, e))?;
    let column = reader
        .headers()
        .map_err(|e| report_err(path, e))?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("symbol"))
        .ok_or_else(|| report_err(path, "missing 'symbol' column"))?;

    let mut symbols = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| report_err(path, e))?;
        if let Some(symbol) = record.get(column).map(str::trim).filter(|s| !s.is_empty()) {
            symbols.push(symbol.to_string());
        }
    }
    Ok(symbols)
}
