// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tracing subscriber setup. Everything goes to stderr; stdout belongs to
//! the summary and to the `measure` line.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Verbosity picked on the command line; `RUST_LOG` still overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn level(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::WARN,
            Verbosity::Normal => LevelFilter::INFO,
            Verbosity::Verbose => LevelFilter::DEBUG,
        }
    }
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init(verbosity: Verbosity) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity.level().into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
