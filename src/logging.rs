use aegis_partman::internal::files;
use anyhow::Context;
use flexi_logger::{style, DeferredNow, Duplicate, FileSpec, LogSpecification, Logger, LoggerHandle};
use log::LevelFilter;
use std::io::Write;
use std::path::Path;

/// The returned handle has to stay alive for as long as the program logs.
pub fn init(verbosity: u8, log_file_path: &str) -> anyhow::Result<LoggerHandle> {
  let log_specification = match verbosity {
    0 => LogSpecification::builder()
      .default(LevelFilter::Info)
      .build(),
    1 => LogSpecification::builder()
      .default(LevelFilter::Debug)
      .build(),
    _ => LogSpecification::builder()
      .default(LevelFilter::Trace)
      .build(),
  };

  // Start every run with a fresh log
  let log_file = Path::new(log_file_path).with_extension("log");
  if log_file.exists() {
    files::remove_file(&log_file)
      .with_context(|| format!("Remove old log file {}", log_file.display()))?;
  }

  let handle = Logger::with(log_specification)
    .log_to_file(
      FileSpec::default()
        .basename(log_file_path)
        .suffix("log")
        .suppress_timestamp(),
    )
    .duplicate_to_stderr(Duplicate::All)
    .format(format_log_entry)
    .start()
    .context("Start logger")?;
  Ok(handle)
}

/// Formats a log entry with color
fn format_log_entry(
  w: &mut dyn Write,
  now: &mut DeferredNow,
  record: &log::Record,
) -> std::io::Result<()> {
  let level = record.level();
  let time = now.now();
  write!(
    w,
    "[ {} ] {:02}:{:02}:{:02} {}",
    style(level).paint(level.to_string()),
    time.hour(),
    time.minute(),
    time.second(),
    record.args()
  )
}
