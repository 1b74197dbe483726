use std::env;

/// Environment variable selecting the telemetry level.
pub const LOG_LEVEL_VAR: &str = "ARENAS_LOG_LEVEL";

/// How much the registry reports to its [`Telemetry`](crate::Telemetry) observer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
  /// No events.
  #[default]
  Off = 0,
  /// Chunks drawn from and returned to the system allocator.
  Chunks = 1,
  /// Chunk events plus every request served from an arena.
  Full = 2,
}

impl LogLevel {
  /// Parses `0`, `1` or `2`. Anything else is `Off`.
  pub fn parse(raw: Option<&str>) -> Self {
    match raw.map(str::trim).and_then(|s| s.parse::<u8>().ok()) {
      Some(1) => LogLevel::Chunks,
      Some(2) => LogLevel::Full,
      _ => LogLevel::Off,
    }
  }

  pub fn from_env() -> Self {
    Self::parse(env::var(LOG_LEVEL_VAR).ok().as_deref())
  }
}

/// Registry settings, read once at init.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  pub log_level: LogLevel,
  /// Cap on bytes drawn from the system allocator. `None` uses the available
  /// physical memory at init.
  pub budget_ceiling: Option<usize>,
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      log_level: LogLevel::from_env(),
      budget_ceiling: None,
    }
  }

  pub fn with_log_level(
    mut self,
    log_level: LogLevel,
  ) -> Self {
    self.log_level = log_level;
    self
  }

  pub fn with_budget_ceiling(
    mut self,
    ceiling: usize,
  ) -> Self {
    self.budget_ceiling = Some(ceiling);
    self
  }
}
