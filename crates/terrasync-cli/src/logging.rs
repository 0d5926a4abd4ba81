use tracing_subscriber::EnvFilter;

/// Route `tracing` output to stderr so stdout stays clean for reports.
///
/// `RUST_LOG` wins when set; otherwise `verbosity` picks the level.
pub fn init(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}
