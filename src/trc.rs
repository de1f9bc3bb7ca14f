//! Tracing configuration and initialization.

use std::io::IsTerminal as _;

use tracing_subscriber::{
    EnvFilter,
    fmt::format::FmtSpan,
    util::{SubscriberInitExt as _, TryInitError},
};

enum TrcMode {
    /// Plain, verbose output with span events.
    Verbose,
    /// Compact output without timestamps.
    Compact,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let maybe_env_filter =
            EnvFilter::try_from_env("FS_PROXY_LOG").or_else(|_| EnvFilter::try_from_default_env());

        match maybe_env_filter {
            Ok(env_filter) => Self {
                // Explicit filter selects verbose output.
                mode: TrcMode::Verbose,
                env_filter,
            },
            Err(_) => Self {
                mode: TrcMode::Compact,
                env_filter: EnvFilter::new("info"),
            },
        }
    }
}

impl Trc {
    pub fn init(self) -> Result<(), TryInitError> {
        let ansi = stderr_colors(std::io::stderr().is_terminal(), |name| {
            std::env::var_os(name).is_some_and(|v| !v.is_empty())
        });
        match self.mode {
            TrcMode::Verbose => tracing_subscriber::fmt()
                .with_env_filter(self.env_filter)
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
                .finish()
                .try_init(),
            TrcMode::Compact => tracing_subscriber::fmt()
                .with_env_filter(self.env_filter)
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(false)
                .without_time()
                .compact()
                .finish()
                .try_init(),
        }
    }
}

/// `FORCE_COLOR` always wins; otherwise color a terminal unless `NO_COLOR` is set.
fn stderr_colors(is_terminal: bool, env_set: impl Fn(&str) -> bool) -> bool {
    env_set("FORCE_COLOR") || (is_terminal && !env_set("NO_COLOR"))
}
