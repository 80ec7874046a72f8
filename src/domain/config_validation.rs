//! Typed, validated reads of numeric config values.
//!
//! Each helper falls back to `default` when the key is absent and rejects
//! out-of-range values with `ConfigInvalid`.

use crate::domain::error::SticklabError;
use crate::ports::config_port::ConfigPort;

fn invalid(section: &str, key: &str, reason: String) -> SticklabError {
    SticklabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

pub fn positive_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SticklabError> {
    let value = config.get_double(section, key, default);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(section, key, format!("{key} must be positive, got {value}")));
    }
    Ok(value)
}

pub fn non_negative_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SticklabError> {
    let value = config.get_double(section, key, default);
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(
            section,
            key,
            format!("{key} must be non-negative, got {value}"),
        ));
    }
    Ok(value)
}

/// A fraction in (0, 1].
pub fn fraction(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SticklabError> {
    let value = config.get_double(section, key, default);
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(
            section,
            key,
            format!("{key} must be in (0, 1], got {value}"),
        ));
    }
    Ok(value)
}

pub fn positive_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, SticklabError> {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| invalid(section, key, format!("{key} must be a positive integer, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn defaults_apply_when_absent() {
        let config = make_config("[supertrend]\n");
        assert_eq!(positive_f64(&config, "supertrend", "multiplier", 3.0).unwrap(), 3.0);
        assert_eq!(positive_usize(&config, "supertrend", "period", 10).unwrap(), 10);
        assert_eq!(fraction(&config, "supertrend", "risk_per_trade", 0.01).unwrap(), 0.01);
    }

    #[test]
    fn file_values_win() {
        let config = make_config("[supertrend]\nmultiplier = 2.5\nperiod = 7\n");
        assert_eq!(positive_f64(&config, "supertrend", "multiplier", 3.0).unwrap(), 2.5);
        assert_eq!(positive_usize(&config, "supertrend", "period", 10).unwrap(), 7);
    }

    #[test]
    fn negative_multiplier_fails() {
        let config = make_config("[supertrend]\nmultiplier = -1\n");
        let err = positive_f64(&config, "supertrend", "multiplier", 3.0).unwrap_err();
        assert!(matches!(err, SticklabError::ConfigInvalid { key, .. } if key == "multiplier"));
    }

    #[test]
    fn zero_period_fails() {
        let config = make_config("[supertrend]\nperiod = 0\n");
        let err = positive_usize(&config, "supertrend", "period", 10).unwrap_err();
        assert!(matches!(err, SticklabError::ConfigInvalid { key, .. } if key == "period"));
    }

    #[test]
    fn fraction_above_one_fails() {
        let config = make_config("[signal_backtest]\ntake_profit = 1.5\n");
        assert!(fraction(&config, "signal_backtest", "take_profit", 0.075).is_err());
    }

    #[test]
    fn non_negative_allows_zero() {
        let config = make_config("[supertrend]\nmin_avg_volume = 0\n");
        assert_eq!(
            non_negative_f64(&config, "supertrend", "min_avg_volume", 10_000.0).unwrap(),
            0.0
        );
        let config = make_config("[supertrend]\nmin_avg_volume = -5\n");
        assert!(non_negative_f64(&config, "supertrend", "min_avg_volume", 10_000.0).is_err());
    }
}
