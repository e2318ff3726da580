//! Console logging for the command line program.
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

use crate::error::ClimGridError;

const LOG_PATTERN: &str = "{h({d(%Y-%m-%d %H:%M:%S)} [{l}] {M})} - {m}{n}";

/// Send log messages at or above `level` to stderr.
///
/// Library functions only use the `log` macros, so programs embedding the
/// crate can install any other logger instead.
pub fn init_logging(level: log::LevelFilter) -> Result<(), ClimGridError> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .target(Target::Stderr)
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| ClimGridError::Config(format!("invalid logger configuration: {e}")))?;

    log4rs::init_config(config)
        .map_err(|e| ClimGridError::Config(format!("could not install the logger: {e}")))?;
    Ok(())
}
