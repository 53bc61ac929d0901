//! Tracing subscriber setup.
//!
//! Filter comes from `RUST_LOG`, falling back to `news_signal_pipeline=info,warn`.
//! `LOG_FORMAT=json` switches to JSON lines.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "news_signal_pipeline=info,warn";

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // try_init: a second call (tests, embedding) keeps the first subscriber
    let _ = if json {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
