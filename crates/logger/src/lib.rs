use colored::Colorize;
use log::Level;
use std::sync::OnceLock;

/// Colored stdout logger for the trellis engine and its tests.
#[derive(Clone)]
pub struct Logger {
  level: Level,
}

impl log::Log for Logger {
  fn enabled(&self, metadata: &log::Metadata) -> bool {
    metadata.level() <= self.level
  }

  fn log(&self, record: &log::Record) {
    if !self.enabled(record.metadata()) {
      return;
    }

    let time = chrono::Local::now()
      .format("%Y-%m-%d %H:%M:%S%.3f")
      .to_string()
      .magenta();

    let level = match record.level() {
      Level::Error => "ERROR".red(),
      Level::Warn => "WARN".yellow(),
      Level::Info => "INFO".green(),
      Level::Debug => "DEBUG".blue(),
      Level::Trace => "TRACE".dimmed(),
    };

    let target = record.target().cyan();

    println!("{} {} {} {}", time, level, target, record.args());
  }

  fn flush(&self) {}
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

pub fn init_logger() {
  init_logger_with_level(Level::Debug);
}

/// Installs the logger once per process. Later calls keep the first level.
pub fn init_logger_with_level(level: Level) {
  let mut installed = false;
  let logger = LOGGER.get_or_init(|| {
    installed = true;
    Logger { level }
  });

  if installed && log::set_logger(logger).is_ok() {
    log::set_max_level(level.to_level_filter());
  }
}
