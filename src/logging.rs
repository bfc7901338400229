//! stderr logging for the binaries.

use std::io::Write;

use log::LevelFilter;

/// Maps a `-v` count to a level: 0 warn, 1 info, 2 debug, 3 or more trace.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the global logger. Every line goes to stderr prefixed with `[program]`.
/// `RUST_LOG`, when set, overrides the verbosity. Calling it twice is harmless.
pub fn init(program: &str, verbosity: u8) {
    let prefix = format!("[{}]", program);
    let _ = env_logger::Builder::new()
        .filter_level(level_for(verbosity))
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format(move |buf, record| {
            if record.level() <= log::Level::Warn {
                writeln!(
                    buf,
                    "{} {}: {}",
                    prefix,
                    record.level().as_str().to_lowercase(),
                    record.args()
                )
            } else {
                writeln!(buf, "{} {}", prefix, record.args())
            }
        })
        .try_init();
}
