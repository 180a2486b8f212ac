//! GC Logging and Tracing
//!
//! Every collection event goes through the collector's [`GcLogger`]:
//!
//! - it is forwarded to the `log` crate at a level matching its cost
//! - it is optionally echoed on the console (human or JSON lines)
//! - it is optionally kept in memory, grouped by section, for tests and
//!   post-mortem analysis
//!
//! Sections:
//! - `gc-minor` - one minor collection
//! - `gc-collect-step` - one major collection step
//! - `gc-collect-done` - end of a major cycle
//! - `gc-finalizers` - objects queued for finalization
//! - `gc-weakrefs` - weakrefs cleared at the end of marking
//!
//! Log Levels:
//! - INFO: major cycles
//! - DEBUG: steps, finalizers, weakrefs
//! - TRACE: minor collections

use crate::gc::GcState;
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::Serialize;

/// Log level for GC operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// GC event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcEvent {
    /// A minor collection finished
    MinorCollection {
        promoted_objects: usize,
        promoted_bytes: usize,
        total_memory_used: usize,
        duration_us: u64,
    },

    /// A major collection step finished
    CollectStep {
        old_state: GcState,
        new_state: GcState,
        work: usize,
        duration_us: u64,
    },

    /// A major cycle finished
    MajorCollection {
        count: usize,
        live_bytes: usize,
        next_threshold: usize,
        arenas_count_before: usize,
        arenas_count_after: usize,
    },

    /// Unreachable finalizable objects were queued
    Finalizers { queued: usize },

    /// Old weakrefs were cleared
    WeakRefs { cleared: usize },
}

impl GcEvent {
    /// Section name of the event
    pub fn section(&self) -> &'static str {
        match self {
            GcEvent::MinorCollection { .. } => "gc-minor",
            GcEvent::CollectStep { .. } => "gc-collect-step",
            GcEvent::MajorCollection { .. } => "gc-collect-done",
            GcEvent::Finalizers { .. } => "gc-finalizers",
            GcEvent::WeakRefs { .. } => "gc-weakrefs",
        }
    }

    fn level(&self) -> LogLevel {
        match self {
            GcEvent::MajorCollection { .. } => LogLevel::Info,
            GcEvent::CollectStep { .. } | GcEvent::Finalizers { .. } | GcEvent::WeakRefs { .. } => {
                LogLevel::Debug
            },
            GcEvent::MinorCollection { .. } => LogLevel::Trace,
        }
    }
}

impl std::fmt::Display for GcEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GcEvent::MinorCollection {
                promoted_objects,
                promoted_bytes,
                total_memory_used,
                duration_us,
            } => write!(
                f,
                "[GC] minor: {} objects promoted ({} bytes), old gen {} bytes, {} us",
                promoted_objects, promoted_bytes, total_memory_used, duration_us
            ),
            GcEvent::CollectStep {
                old_state,
                new_state,
                work,
                duration_us,
            } => write!(
                f,
                "[GC] step {} -> {}: {} units of work, {} us",
                old_state, new_state, work, duration_us
            ),
            GcEvent::MajorCollection {
                count,
                live_bytes,
                next_threshold,
                arenas_count_before,
                arenas_count_after,
            } => write!(
                f,
                "[GC] major #{} done: {} live bytes, next at {} bytes, arenas {} -> {}",
                count, live_bytes, next_threshold, arenas_count_before, arenas_count_after
            ),
            GcEvent::Finalizers { queued } => {
                write!(f, "[GC] {} objects queued for finalization", queued)
            },
            GcEvent::WeakRefs { cleared } => write!(f, "[GC] {} weakrefs cleared", cleared),
        }
    }
}

/// GC Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Most verbose level forwarded anywhere
    pub level: LogLevel,

    /// Echo events on stdout
    pub console: bool,

    /// Use JSON lines on the console
    pub json: bool,

    /// Prefix console lines with a timestamp
    pub timestamps: bool,

    /// Keep events in memory
    pub record: bool,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Trace,
            console: false,
            json: false,
            timestamps: true,
            record: false,
        }
    }
}

/// Per-collector event log
#[derive(Debug, Default)]
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Vec<(DateTime<Local>, GcEvent)>,
    sections: IndexMap<&'static str, usize>,
}

impl GcLogger {
    /// Create new GC logger
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Vec::new(),
            sections: IndexMap::new(),
        }
    }

    /// Change the configuration; recorded events are kept
    pub fn configure(&mut self, config: GcLoggerConfig) {
        self.config = config;
    }

    /// Current configuration
    pub fn config(&self) -> &GcLoggerConfig {
        &self.config
    }

    /// Log a GC event
    pub fn record(&mut self, event: GcEvent) {
        *self.sections.entry(event.section()).or_insert(0) += 1;

        let level = event.level();
        if level > self.config.level {
            return;
        }
        log::log!(target: event.section(), level.into(), "{}", event);

        if self.config.console {
            self.output_console(&event);
        }
        if self.config.record {
            self.events.push((Local::now(), event));
        }
    }

    fn output_console(&self, event: &GcEvent) {
        let line = if self.config.json {
            match serde_json::to_string(event) {
                Ok(json) => json,
                Err(_) => return,
            }
        } else {
            event.to_string()
        };

        if self.config.timestamps {
            let now = chrono::Local::now();
            println!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), line);
        } else {
            println!("{}", line);
        }
    }

    /// Number of events seen per section, in first-seen order
    ///
    /// Counted whether or not events are recorded.
    pub fn summary(&self) -> &IndexMap<&'static str, usize> {
        &self.sections
    }

    /// Number of events seen in `section`
    pub fn section_count(&self, section: &str) -> usize {
        self.sections.get(section).copied().unwrap_or(0)
    }

    /// Recorded events
    pub fn events(&self) -> &[(DateTime<Local>, GcEvent)] {
        &self.events
    }

    /// Recorded events of one section
    pub fn events_in<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a GcEvent> + 'a {
        self.events
            .iter()
            .map(|(_, event)| event)
            .filter(move |event| event.section() == section)
    }

    /// Forget recorded events and section counts
    pub fn reset(&mut self) {
        self.events.clear();
        self.sections.clear();
    }

    /// Recorded events as JSON lines, each with an RFC 3339 `timestamp`
    pub fn to_json_lines(&self) -> String {
        let mut out = String::new();
        for (time, event) in &self.events {
            let line = JsonLine {
                timestamp: time.to_rfc3339(),
                event,
            };
            if let Ok(json) = serde_json::to_string(&line) {
                out.push_str(&json);
                out.push('\n');
            }
        }
        out
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a GcEvent,
}
