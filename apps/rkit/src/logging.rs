// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Logging initialization: console and/or file sinks driven by [`LogConfig`].

use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{LogConfig, LogFormat, LogLevel};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Per-sink filter: an explicit `RUST_LOG` wins over the configured level.
fn sink_filter(level: &LogLevel) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level: tracing::Level = level.clone().into();
            EnvFilter::default().add_directive(level.into())
        },
    }
}

/// Opens the non-blocking writer for the configured log file, creating the
/// parent directory when the path has one.
fn open_log_file(
    configured_path: &str,
) -> Result<
    (tracing_appender::non_blocking::NonBlocking, tracing_appender::non_blocking::WorkerGuard),
    Box<dyn std::error::Error>,
> {
    let path = std::path::Path::new(configured_path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => std::path::Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create log directory {}: {e}", dir.display()))?;

    let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("rkit.log"));
    Ok(tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name)))
}

/// Initialize logging based on configuration.
///
/// The returned guard must be kept alive for the life of the process so
/// buffered file output is flushed.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.console_enable {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_filter(sink_filter(&config.console_level))
                .boxed(),
        );
    }

    if config.file_enable {
        let (writer, file_guard) = open_log_file(&config.file_path)?;
        guard = Some(file_guard);
        let file_layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
        layers.push(match config.file_format {
            LogFormat::Json => {
                file_layer.json().with_filter(sink_filter(&config.file_level)).boxed()
            },
            LogFormat::Text => file_layer.with_filter(sink_filter(&config.file_level)).boxed(),
        });
    }

    // Never come up silent: with both sinks disabled, keep INFO on the
    // console.
    let silent = layers.is_empty();
    if silent {
        layers.push(
            tracing_subscriber::fmt::layer().with_filter(sink_filter(&LogLevel::Info)).boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).init();

    if silent {
        tracing::warn!(
            "Console and file logging are both disabled, falling back to console at INFO"
        );
    }

    Ok(guard)
}
