//! CLI definition and dispatch.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvReportAdapter, read_symbol_list};
use crate::adapters::file_config_adapter::{EnvOverlay, FileConfigAdapter};
use crate::domain::cot::{CATEGORIES, get_cot_data};
use crate::domain::currency_strength::{MAJORS, TIMEFRAMES, compute_currency_strength, latest_moves};
use crate::domain::error::SticklabError;
use crate::domain::indicator::ema::ema_ribbon;
use crate::domain::iv_rank::get_iv_rank;
use crate::domain::signal_backtest::{
    SignalBacktestConfig, SignalSummary, run_signal_backtest, symbols_from_dir,
};
use crate::domain::stick::{DAILY, Interval, StickQuery};
use crate::domain::stick_codec::get_sticks;
use crate::domain::stock_metadata::refresh_metadata;
use crate::domain::supertrend_backtest::{SupertrendConfig, run_backtest};
use crate::domain::td_scan;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "sticklab", about = "Stick decoding and trading research toolkit")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode and print or export the sticks of one symbol
    Sticks {
        symbol: String,
        /// Bar interval in minutes
        #[arg(short, long, default_value_t = DAILY)]
        interval: Interval,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Only read the newest N buckets
        #[arg(long)]
        limit: Option<usize>,
        /// Append EMA 18/50/200 of the ask close
        #[arg(long)]
        ribbon: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List symbols that have stored sticks
    Symbols,
    /// Scan hot stocks for completed TD Sequential setups
    TdScan {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Portfolio backtest of the Supertrend trend-following strategy
    Supertrend {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// CSV file with a `symbol` column; defaults to the hot-stock list
        #[arg(long)]
        symbols: Option<PathBuf>,
        #[arg(long)]
        trades: Option<PathBuf>,
        #[arg(long)]
        equity: Option<PathBuf>,
    },
    /// Fixed-horizon backtest of chart signals named `<rank>-<SYMBOL>.jpg`
    SignalBacktest {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        start: NaiveDate,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Implied-volatility rank of one symbol
    IvRank { symbol: String },
    /// Commitments of Traders reports by category or asset name
    Cot {
        /// fx, stock_index, commodities, bonds, crypto, or an asset name
        category: Option<String>,
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long)]
        limit: Option<usize>,
        /// List stored assets and the report date range instead
        #[arg(long)]
        list: bool,
    },
    /// Recompute the stock_metadata table from recent daily sticks
    RefreshMetadata,
    /// Currency strength matrix from the latest sticks of FX epics
    FxStrength {
        #[arg(required = true, num_args = 1..)]
        epics: Vec<String>,
    },
}

pub type AppConfig = EnvOverlay<FileConfigAdapter>;

pub fn run(cli: Cli) -> ExitCode {
    let result = load_config(cli.config.as_deref())
        .and_then(|config| dispatch(cli.command, &config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// The INI file when given, always overlaid with `STICKLAB_*` variables.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, SticklabError> {
    let file = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            FileConfigAdapter::from_file(path)?
        }
        None => FileConfigAdapter::empty(),
    };
    Ok(EnvOverlay::from_env(file))
}

/// Open the backend named by `[database] backend`.
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn MarketDataPort>, SticklabError> {
    let default_backend = if cfg!(feature = "sqlite") {
        "sqlite"
    } else {
        "postgres"
    };
    let backend = config
        .get_string("database", "backend")
        .unwrap_or_else(|| default_backend.to_string());

    match backend.trim().to_lowercase().as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            let adapter = SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok(Box::new(adapter))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            use crate::adapters::postgres_adapter::PostgresAdapter;
            Ok(Box::new(PostgresAdapter::from_config(config)?))
        }
        other => Err(SticklabError::ConfigInvalid {
            section: "database".into(),
            key: "backend".into(),
            reason: format!("backend '{other}' is not available in this build"),
        }),
    }
}

/// `explicit` if given, else `default_name` under `[report] output_dir`,
/// else nothing.
pub fn resolve_output(
    config: &dyn ConfigPort,
    explicit: Option<PathBuf>,
    default_name: &str,
) -> Option<PathBuf> {
    explicit.or_else(|| {
        config
            .get_string("report", "output_dir")
            .map(|dir| PathBuf::from(dir).join(default_name))
    })
}

pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last second of `date`.
pub fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1) - Duration::seconds(1)
}

/// Window for optional `--from`/`--to`; open ends run to the epoch and now.
pub fn stick_query(
    symbol: &str,
    interval: Interval,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: Option<usize>,
) -> StickQuery {
    let mut query = StickQuery::new(symbol, interval);
    if from.is_some() || to.is_some() {
        let from = from.map_or(DateTime::<Utc>::UNIX_EPOCH, day_start);
        let to = to.map_or_else(Utc::now, day_end);
        query = query.between(from, to);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    query
}

fn dispatch(command: Command, config: &AppConfig) -> Result<(), SticklabError> {
    let port = open_data_port(config)?;
    let port = port.as_ref();

    match command {
        Command::Sticks {
            symbol,
            interval,
            from,
            to,
            limit,
            ribbon,
            output,
        } => {
            let query = stick_query(&symbol, interval, from, to, limit);
            run_sticks(port, &query, ribbon, output.as_deref())
        }
        Command::Symbols => {
            let symbols = port.list_symbols()?;
            for symbol in &symbols {
                println!("{symbol}");
            }
            eprintln!("{} symbols found", symbols.len());
            Ok(())
        }
        Command::TdScan { output } => {
            let output = resolve_output(
                config,
                output,
                &format!("td_signals_{}.csv", Utc::now().format("%Y%m%d")),
            );
            run_td_scan(port, Utc::now(), output.as_deref())
        }
        Command::Supertrend {
            start,
            end,
            symbols,
            trades,
            equity,
        } => {
            let settings = SupertrendConfig::from_config(config)?;
            let symbols = match symbols {
                Some(path) => read_symbol_list(&path)?,
                None => port.hot_symbols()?,
            };
            let trades = resolve_output(config, trades, "supertrend_trades.csv");
            let equity = resolve_output(config, equity, "supertrend_equity.csv");
            run_supertrend(
                port,
                &symbols,
                start,
                end,
                &settings,
                trades.as_deref(),
                equity.as_deref(),
            )
        }
        Command::SignalBacktest { dir, start, output } => {
            let settings = SignalBacktestConfig::from_config(config)?;
            let symbols = symbols_from_dir(&dir)?;
            let output = resolve_output(
                config,
                output,
                &format!("signal_backtest_{}.csv", start.format("%Y%m%d")),
            );
            run_signals(port, &symbols, start, &settings, output.as_deref())
        }
        Command::IvRank { symbol } => {
            let rank = get_iv_rank(port.as_options_port(), &symbol.to_uppercase())?;
            println!("IV Rank for {}", rank.symbol);
            println!("  current IV:   {:.4}", rank.current_iv);
            println!("  IV rank:      {:.2}", rank.iv_rank);
            println!("  1y high/low:  {:.4} / {:.4}", rank.year_high, rank.year_low);
            println!(
                "  data:         {} to {} ({} days)",
                rank.data_start, rank.data_end, rank.total_data_points
            );
            Ok(())
        }
        Command::Cot {
            category,
            days,
            limit,
            list,
        } => run_cot(port, category.as_deref(), days, limit, list),
        Command::RefreshMetadata => {
            let written = refresh_metadata(port, Utc::now())?;
            eprintln!("{written} metadata records written");
            Ok(())
        }
        Command::FxStrength { epics } => run_fx_strength(port, &epics, Utc::now()),
    }
}

pub fn run_sticks(
    port: &dyn MarketDataPort,
    query: &StickQuery,
    ribbon: bool,
    output: Option<&Path>,
) -> Result<(), SticklabError> {
    let sticks = get_sticks(port.as_stick_port(), query)?;
    let ribbon = ribbon.then(|| ema_ribbon(&sticks));

    if let Some(path) = output {
        CsvReportAdapter::new().write_sticks(&sticks, ribbon.as_ref(), path)?;
    } else {
        for (i, s) in sticks.iter().enumerate() {
            let mut line = format!(
                "{}  ask {:.5}/{:.5}/{:.5}/{:.5}  bid {:.5}/{:.5}/{:.5}/{:.5}  vol {}",
                s.datetime.format("%Y-%m-%d %H:%M"),
                s.ask_open,
                s.ask_high,
                s.ask_low,
                s.ask_close,
                s.bid_open,
                s.bid_high,
                s.bid_low,
                s.bid_close,
                s.volume
            );
            if let Some([e18, e50, e200]) = ribbon.as_ref().and_then(|r| r.row(i)) {
                line.push_str(&format!("  ema {e18:.5}/{e50:.5}/{e200:.5}"));
            }
            println!("{line}");
        }
    }
    eprintln!("{} sticks for {}", sticks.len(), query.symbol);
    Ok(())
}

pub fn run_td_scan(
    port: &dyn MarketDataPort,
    now: DateTime<Utc>,
    output: Option<&Path>,
) -> Result<(), SticklabError> {
    let signals = td_scan::scan(port, now)?;
    for s in &signals {
        println!(
            "{:<8} {}  {:<7}  {:<15}  close {:>10.2}  $vol {:>15.0}",
            s.symbol,
            s.date,
            s.signal_type,
            s.signal_type.signal_name(),
            s.close_price,
            s.dollar_volume
        );
    }
    if let Some(path) = output {
        CsvReportAdapter::new().write_td_signals(&signals, path)?;
    }
    eprintln!("{} TD signals", signals.len());
    Ok(())
}

pub fn run_supertrend(
    port: &dyn MarketDataPort,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
    settings: &SupertrendConfig,
    trades_path: Option<&Path>,
    equity_path: Option<&Path>,
) -> Result<(), SticklabError> {
    if end < start {
        return Err(SticklabError::ConfigInvalid {
            section: "supertrend".into(),
            key: "end".into(),
            reason: format!("end {end} is before start {start}"),
        });
    }

    let result = run_backtest(
        port.as_stick_port(),
        symbols,
        day_start(start),
        day_end(end),
        settings,
    )?;
    let m = &result.metrics;

    println!("Supertrend backtest {start} to {end}");
    println!("  initial balance:  {:.2}", result.initial_balance);
    println!("  final equity:     {:.2}", result.final_equity);
    println!("  total return:     {:.2}%", m.total_return * 100.0);
    println!("  annualized:       {:.2}%", m.annualized_return * 100.0);
    println!("  sharpe / sortino: {:.2} / {:.2}", m.sharpe_ratio, m.sortino_ratio);
    println!(
        "  max drawdown:     {:.2}% over {} days",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    );
    println!(
        "  trades:           {} ({} won, {} lost, win rate {:.1}%)",
        result.trades.len(),
        m.trades_won,
        m.trades_lost,
        m.win_rate * 100.0
    );
    println!("  profit factor:    {:.2}", m.profit_factor);

    let reports = CsvReportAdapter::new();
    if let Some(path) = trades_path {
        reports.write_trades(&result.trades, path)?;
    }
    if let Some(path) = equity_path {
        reports.write_equity_curve(&result.equity_curve, path)?;
    }
    Ok(())
}

pub fn run_signals(
    port: &dyn MarketDataPort,
    symbols: &[String],
    start: NaiveDate,
    settings: &SignalBacktestConfig,
    output: Option<&Path>,
) -> Result<(), SticklabError> {
    let results = run_signal_backtest(port.as_stick_port(), symbols, day_start(start), settings);
    let summary = SignalSummary::from_results(&results);

    println!("Signal backtest from {start}");
    println!(
        "  trades:      {} ({} ok, {} failed)",
        summary.total_trades, summary.successful_trades, summary.failed_trades
    );
    println!(
        "  win rate:    {:.1}% ({} won, {} lost)",
        summary.win_rate, summary.winning_trades, summary.losing_trades
    );
    println!(
        "  P&L %:       mean {:.2}, median {:.2}, std {:.2}",
        summary.avg_pnl_pct, summary.median_pnl_pct, summary.std_pnl_pct
    );
    println!("  total P&L:   {:.2}", summary.total_pnl);
    if let (Some(best), Some(worst)) = (&summary.best_trade, &summary.worst_trade) {
        println!("  best:        {} {:.2}%", best.symbol, best.pnl_pct);
        println!("  worst:       {} {:.2}%", worst.symbol, worst.pnl_pct);
    }
    println!(
        "  exits:       {} take profit, {} stop loss, {} time limit",
        summary.take_profit_exits, summary.stop_loss_exits, summary.time_limit_exits
    );
    println!(
        "  fallbacks:   {} entry, {} exit",
        summary.entry_fallbacks, summary.exit_fallbacks
    );

    if let Some(path) = output {
        CsvReportAdapter::new().write_signal_results(&results, path)?;
    }
    Ok(())
}

pub fn run_cot(
    port: &dyn MarketDataPort,
    category: Option<&str>,
    days: i64,
    limit: Option<usize>,
    list: bool,
) -> Result<(), SticklabError> {
    if list {
        for asset in port.available_assets()? {
            println!("{asset}");
        }
        match port.date_range()? {
            Some(range) => eprintln!(
                "{} reports from {} to {}",
                range.total_records, range.earliest, range.latest
            ),
            None => eprintln!("no COT reports stored"),
        }
        return Ok(());
    }

    let Some(category) = category else {
        return Err(SticklabError::ConfigMissing {
            section: "cot".into(),
            key: format!("category (one of {})", CATEGORIES.join(", ")),
        });
    };

    let today = Utc::now().date_naive();
    let reports = get_cot_data(port.as_cot_port(), category, days, limit, today)?;
    for r in &reports {
        println!(
            "{}  {:<55} OI {:>10}  lev net {:>9}  am net {:>9}  dealer net {:>9}",
            r.report_date,
            r.asset,
            r.open_interest,
            r.lev_money.net,
            r.asset_mgr.net,
            r.dealer.net
        );
    }
    eprintln!("{} COT reports", reports.len());
    Ok(())
}

pub fn run_fx_strength(
    port: &dyn MarketDataPort,
    epics: &[String],
    now: DateTime<Utc>,
) -> Result<(), SticklabError> {
    let feed = latest_moves(port.as_stick_port(), epics, now)?;
    let timeframes: Vec<&str> = TIMEFRAMES.iter().map(|(label, _)| *label).collect();
    let matrix = compute_currency_strength(&feed, &MAJORS, &timeframes);

    print!("{:<5}", "");
    for currency in &matrix.currencies {
        print!("{currency:>9}");
    }
    println!();
    for (tf, row) in matrix.timeframes.iter().zip(&matrix.scores) {
        print!("{tf:<5}");
        for score in row {
            print!("{:>8.3}%", score * 100.0);
        }
        println!();
    }
    Ok(())
}
