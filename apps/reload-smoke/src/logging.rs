//! Log setup for `reload-smoke`.
//!
//! The smoke client exists to show what the reload channel is doing, so the
//! default filter keeps the client crates at `debug` (pings, internal
//! messages, read-loop exit) while everything else stays at `info`.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,reload_client=debug,reload_core=debug";
const FILTER_ENV_KEYS: [&str; 2] = ["RUST_LOG", "RELOAD_LOG"];

/// Install a compact stderr subscriber. A second call is a no-op.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_env_filter(EnvFilter::new(filter_directives(|key| env::var(key).ok())))
        .try_init();
}

/// First non-blank, parseable directive among `RUST_LOG` and `RELOAD_LOG`,
/// else the built-in default.
fn filter_directives<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    FILTER_ENV_KEYS
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
}
