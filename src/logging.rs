//! Tracing subscriber setup for the command-line tool.
//!
//! Logs go to stderr so report output on stdout stays clean.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Connection pool chatter stays at `warn` unless `RUST_LOG` says otherwise.
const NOISY_MODULES: &[&str] = &["r2d2", "postgres", "tokio_postgres"];

fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG` wins when set; otherwise `sticklab` logs at info, raised one
/// level per `-v`.
fn build_filter(verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = format!("warn,sticklab={}", level_for(verbose));
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }
    EnvFilter::new(directives)
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(verbose: u8) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose > 0);
    let _ = tracing_subscriber::registry()
        .with(build_filter(verbose))
        .with(fmt_layer)
        .try_init();
}
