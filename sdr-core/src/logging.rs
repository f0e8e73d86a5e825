//! Level-filtered console/file logging wired to the [`log`] facade (§4.8,
//! §6.3). Every other module in this crate logs through `log::{trace, debug,
//! info, warn, error}!`; this module is the only place a sink is ever
//! installed.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// One independent sink: a level filter and a format pattern.
#[derive(Debug, Clone)]
pub struct SinkConfig {
	pub level: LevelFilter,
	pub pattern: String,
}

impl Default for SinkConfig {
	fn default() -> Self {
		Self { level: LevelFilter::Info, pattern: "[%T][%l] %v".to_string() }
	}
}

/// The knobs of §6.3, already parsed out of whatever key/value source
/// supplied them (process environment or the session's string-keyed
/// configuration map).
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
	pub console: SinkConfig,
	pub file: Option<FileSinkConfig>,
}

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
	pub sink: SinkConfig,
	pub directory: String,
	pub file_name: String,
	/// strftime-style token appended to `file_name`, e.g. `%Y%m%d-%H%M%S`.
	pub time_format: String,
}

impl LoggingConfig {
	/// Parses the first character of a level string (case-insensitive)
	/// into a [`LevelFilter`], per §6.3: Off/Trace/Debug/Info/Warn/Error/
	/// Critical. `Critical` has no counterpart in the `log` crate and maps
	/// onto `Error`. Unrecognized or empty strings keep `default`.
	pub fn parse_level(value: &str, default: LevelFilter) -> LevelFilter {
		match value.chars().next().map(|c| c.to_ascii_uppercase()) {
			Some('O') => LevelFilter::Off,
			Some('T') => LevelFilter::Trace,
			Some('D') => LevelFilter::Debug,
			Some('I') => LevelFilter::Info,
			Some('W') => LevelFilter::Warn,
			Some('E') | Some('C') => LevelFilter::Error,
			_ => default,
		}
	}

	/// Installs this configuration as the process-wide backend for the
	/// `log` facade. Must be called at most once per process; a second
	/// call returns the underlying `SetLoggerError` wrapped as an I/O
	/// error so callers can decide whether that's fatal.
	pub fn install(self) -> Result<(), log::SetLoggerError> {
		let max_level = self.console.level.max(
			self.file.as_ref().map(|f| f.sink.level).unwrap_or(LevelFilter::Off),
		);
		let file = self.file.as_ref().map(|f| {
			let mut path = std::path::PathBuf::from(&f.directory);
			let stamped = format!("{}{}", f.file_name, strftime_like(&f.time_format));
			path.push(stamped);
			let handle = OpenOptions::new()
				.create(true)
				.append(true)
				.open(&path)
				.unwrap_or_else(|e| panic!("failed to open log file {}: {e}", path.display()));
			Mutex::new(handle)
		});
		let logger = SdrLogger { config: self, file };
		log::set_boxed_logger(Box::new(logger))?;
		log::set_max_level(max_level);
		Ok(())
	}
}

/// A minimal strftime-alike: the only token this crate relies on is a
/// monotonically increasing process timestamp, since the OS-level clock
/// formatting used by full logging frameworks is outside the core's
/// scope (§1). Unrecognized patterns are dropped.
fn strftime_like(pattern: &str) -> String {
	if pattern.is_empty() {
		return String::new();
	}
	let since_epoch = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap_or_default();
	format!("-{}", since_epoch.as_secs())
}

struct SdrLogger {
	config: LoggingConfig,
	file: Option<Mutex<std::fs::File>>,
}

fn format_record(pattern: &str, record: &Record<'_>) -> String {
	let mut out = String::with_capacity(pattern.len() + 32);
	let mut chars = pattern.chars().peekable();
	while let Some(c) = chars.next() {
		if c == '%' {
			match chars.next() {
				Some('l') => out.push_str(record.level().as_str()),
				Some('T') => {
					let since_epoch = std::time::SystemTime::now()
						.duration_since(std::time::UNIX_EPOCH)
						.unwrap_or_default();
					out.push_str(&format!("{:.3}", since_epoch.as_secs_f64()));
				}
				Some('n') => out.push_str(record.target()),
				Some('v') => out.push_str(&record.args().to_string()),
				Some(other) => {
					out.push('%');
					out.push(other);
				}
				None => out.push('%'),
			}
		} else {
			out.push(c);
		}
	}
	out
}

impl Log for SdrLogger {
	fn enabled(&self, metadata: &Metadata<'_>) -> bool {
		metadata.level() <= self.config.console.level
			|| self.config.file.as_ref().is_some_and(|f| metadata.level() <= f.sink.level)
	}

	fn log(&self, record: &Record<'_>) {
		if record.level() <= self.config.console.level {
			let line = format_record(&self.config.console.pattern, record);
			if record.level() <= Level::Warn {
				eprintln!("{line}");
			} else {
				println!("{line}");
			}
		}
		if let Some(file_cfg) = &self.config.file {
			if record.level() <= file_cfg.sink.level {
				if let Some(handle) = &self.file {
					let line = format_record(&file_cfg.sink.pattern, record);
					if let Ok(mut f) = handle.lock() {
						let _ = writeln!(f, "{line}");
					}
				}
			}
		}
	}

	fn flush(&self) {
		if let Some(handle) = &self.file {
			if let Ok(mut f) = handle.lock() {
				let _ = f.flush();
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_level_reads_first_letter_case_insensitively() {
		assert_eq!(LoggingConfig::parse_level("warn", LevelFilter::Off), LevelFilter::Warn);
		assert_eq!(LoggingConfig::parse_level("WARNING", LevelFilter::Off), LevelFilter::Warn);
		assert_eq!(LoggingConfig::parse_level("critical", LevelFilter::Off), LevelFilter::Error);
		assert_eq!(LoggingConfig::parse_level("debug", LevelFilter::Off), LevelFilter::Debug);
	}

	#[test]
	fn parse_level_falls_back_to_default_on_garbage() {
		assert_eq!(LoggingConfig::parse_level("", LevelFilter::Info), LevelFilter::Info);
		assert_eq!(LoggingConfig::parse_level("xyz", LevelFilter::Info), LevelFilter::Info);
	}

	#[test]
	fn format_record_substitutes_level_and_message_tokens() {
		let record = Record::builder()
			.args(format_args!("hello {}", 42))
			.level(Level::Warn)
			.target("sdr_core::test")
			.build();
		let formatted = format_record("[%l] %n: %v", &record);
		assert_eq!(formatted, "[WARN] sdr_core::test: hello 42");
	}
}
