//! Process-wide logger for the demo and for tests that want output.

use env_logger::{Builder, Env, TimestampPrecision};
use log::LevelFilter;

/// Filter used when `RUST_LOG` is unset.
fn default_level(verbose: bool) -> LevelFilter {
    match verbose {
        true => LevelFilter::Debug,
        false => LevelFilter::Info,
    }
}

/// Route `log` records to stderr.  An explicit `RUST_LOG` overrides
/// `verbose`.  Calling this again is a no-op.
pub fn init(verbose: bool) {
    let filter = Env::default().default_filter_or(default_level(verbose).as_str());
    let installed = Builder::from_env(filter)
        .format_timestamp(Some(TimestampPrecision::Millis))
        .format_module_path(false)
        .try_init();
    if installed.is_err() {
        log::trace!("logger already installed");
    }
}
