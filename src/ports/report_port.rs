//! Report output port trait.

use std::path::Path;

use crate::domain::error::SticklabError;
use crate::domain::indicator::ema::EmaRibbon;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::ClosedTrade;
use crate::domain::signal_backtest::SignalTradeResult;
use crate::domain::stick::Stick;
use crate::domain::td_scan::TdSignal;

/// Port for writing tabular results. One call writes one file.
pub trait ReportPort {
    /// Decoded sticks, with the EMA ribbon appended to each row when given.
    fn write_sticks(
        &self,
        sticks: &[Stick],
        ribbon: Option<&EmaRibbon>,
        output_path: &Path,
    ) -> Result<(), SticklabError>;

    fn write_td_signals(&self, signals: &[TdSignal], output_path: &Path)
    -> Result<(), SticklabError>;

    fn write_trades(&self, trades: &[ClosedTrade], output_path: &Path) -> Result<(), SticklabError>;

    fn write_equity_curve(
        &self,
        curve: &[EquityPoint],
        output_path: &Path,
    ) -> Result<(), SticklabError>;

    fn write_signal_results(
        &self,
        results: &[SignalTradeResult],
        output_path: &Path,
    ) -> Result<(), SticklabError>;
}
