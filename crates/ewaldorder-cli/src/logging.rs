use crate::error::{CliError, Result};
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{Layer, Registry, filter::LevelFilter, fmt, prelude::*};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// `-q` silences the terminal; otherwise each `-v` lowers the threshold one
/// level, starting from WARN.
fn console_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// The log file keeps at least INFO so every run leaves a record of the
/// validated request and the search outcome.
fn file_level(verbosity: u8) -> LevelFilter {
    console_level(verbosity, false).max(LevelFilter::INFO)
}

fn console_layer(level: LevelFilter) -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(level)
        .boxed()
}

fn file_layer(path: &Path, level: LevelFilter) -> Result<BoxedLayer> {
    let file = File::create(path).map_err(CliError::Io)?;
    Ok(fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_filter(level)
        .boxed())
}

/// Installs the global subscriber with independently filtered terminal and
/// file outputs.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let mut layers = vec![console_layer(console_level(verbosity, quiet))];
    if let Some(path) = log_file {
        layers.push(file_layer(path, file_level(verbosity))?);
    }
    tracing_subscriber::registry().with(layers).init();
    Ok(())
}
