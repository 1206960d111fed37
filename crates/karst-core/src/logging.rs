//! Pluggable log sinks.
//!
//! A process-wide registry fans kernel log lines out to any number of
//! connected sinks. Each sink carries its own formatting options. Categories
//! can be enabled or disabled globally, and each category has a minimum
//! level below which messages are dropped.
//!
//! Internal crates also emit through `tracing`; the sink registry exists so
//! embedders can capture kernel output without installing a global
//! subscriber.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

/// Message category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Matches every category.
    All,
    Bench,
    Blockstorage,
    Coindb,
    Kernel,
    Validation,
}

/// Message severity, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
}

/// Receiver for formatted log lines.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
}

/// Per-sink formatting options.
#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub timestamps: bool,
    pub microsecond_timestamps: bool,
    pub thread_names: bool,
    pub source_locations: bool,
    /// Prefix lines with `[category:level]`.
    pub category_levels: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            timestamps: true,
            microsecond_timestamps: false,
            thread_names: false,
            source_locations: false,
            category_levels: false,
        }
    }
}

/// Handle for a connected sink. Disconnecting one sink leaves others intact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkId(u64);

struct Registry {
    sinks: Vec<(SinkId, Arc<dyn LogSink>, LogOptions)>,
    next_id: u64,
    /// Default level for categories without an explicit entry.
    global_level: LogLevel,
    levels: HashMap<LogCategory, LogLevel>,
    /// Messages in disabled categories are dropped before formatting.
    disabled: HashMap<LogCategory, bool>,
}

static REGISTRY: LazyLock<Mutex<Registry>> = LazyLock::new(|| {
    Mutex::new(Registry {
        sinks: Vec::new(),
        next_id: 0,
        global_level: LogLevel::Debug,
        levels: HashMap::new(),
        disabled: HashMap::new(),
    })
});

/// Connect a sink. Returns an id usable with [`disconnect_sink`].
pub fn connect_sink(sink: Arc<dyn LogSink>, options: LogOptions) -> SinkId {
    let mut reg = REGISTRY.lock();
    let id = SinkId(reg.next_id);
    reg.next_id += 1;
    reg.sinks.push((id, sink, options));
    id
}

/// Disconnect a previously connected sink. Unknown ids are ignored.
pub fn disconnect_sink(id: SinkId) {
    let mut reg = REGISTRY.lock();
    reg.sinks.retain(|(sink_id, _, _)| *sink_id != id);
}

/// Number of currently connected sinks.
pub fn sink_count() -> usize {
    REGISTRY.lock().sinks.len()
}

/// Enable a category (or all of them).
pub fn enable_category(category: LogCategory) {
    let mut reg = REGISTRY.lock();
    if category == LogCategory::All {
        reg.disabled.clear();
    } else {
        reg.disabled.remove(&category);
    }
}

/// Disable a category (or all of them).
pub fn disable_category(category: LogCategory) {
    let mut reg = REGISTRY.lock();
    if category == LogCategory::All {
        for cat in [
            LogCategory::Bench,
            LogCategory::Blockstorage,
            LogCategory::Coindb,
            LogCategory::Kernel,
            LogCategory::Validation,
        ] {
            reg.disabled.insert(cat, true);
        }
    } else {
        reg.disabled.insert(category, true);
    }
}

/// Set the minimum level for a category, or the global default via `All`.
pub fn set_level(category: LogCategory, level: LogLevel) {
    let mut reg = REGISTRY.lock();
    if category == LogCategory::All {
        reg.global_level = level;
    } else {
        reg.levels.insert(category, level);
    }
}

fn category_name(category: LogCategory) -> &'static str {
    match category {
        LogCategory::All => "all",
        LogCategory::Bench => "bench",
        LogCategory::Blockstorage => "blockstorage",
        LogCategory::Coindb => "coindb",
        LogCategory::Kernel => "kernel",
        LogCategory::Validation => "validation",
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
    }
}

/// Emit a log line to every connected sink that accepts it.
pub fn log(category: LogCategory, level: LogLevel, source: Option<(&str, u32)>, message: &str) {
    let reg = REGISTRY.lock();
    if reg.sinks.is_empty() {
        return;
    }
    if reg.disabled.get(&category).copied().unwrap_or(false) {
        return;
    }
    let min = reg.levels.get(&category).copied().unwrap_or(reg.global_level);
    if level < min {
        return;
    }

    for (_, sink, options) in &reg.sinks {
        sink.log(&format_line(category, level, source, message, options));
    }
}

fn format_line(
    category: LogCategory,
    level: LogLevel,
    source: Option<(&str, u32)>,
    message: &str,
    options: &LogOptions,
) -> String {
    let mut line = String::new();
    if options.timestamps {
        let now = chrono::Utc::now();
        let fmt = if options.microsecond_timestamps {
            "%Y-%m-%dT%H:%M:%S%.6fZ"
        } else {
            "%Y-%m-%dT%H:%M:%SZ"
        };
        line.push_str(&now.format(fmt).to_string());
        line.push(' ');
    }
    if options.thread_names {
        let thread = std::thread::current();
        line.push_str(&format!("[{}] ", thread.name().unwrap_or("?")));
    }
    if options.source_locations {
        if let Some((file, lineno)) = source {
            line.push_str(&format!("[{file}:{lineno}] "));
        }
    }
    if options.category_levels {
        line.push_str(&format!(
            "[{}:{}] ",
            category_name(category),
            level_name(level)
        ));
    }
    line.push_str(message);
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records every delivered line.
    struct Capture(Mutex<Vec<String>>);

    impl Capture {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn lines(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    impl LogSink for Capture {
        fn log(&self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    fn plain() -> LogOptions {
        LogOptions {
            timestamps: false,
            microsecond_timestamps: false,
            thread_names: false,
            source_locations: false,
            category_levels: false,
        }
    }

    // The registry is process-global and tests may run concurrently, so each
    // test asserts only on its own sink's captured lines with messages unique
    // to the test.

    #[test]
    fn connect_delivers_and_disconnect_stops() {
        let sink = Capture::new();
        let id = connect_sink(sink.clone(), plain());

        log(LogCategory::Kernel, LogLevel::Info, None, "cdads-first");
        disconnect_sink(id);
        log(LogCategory::Kernel, LogLevel::Info, None, "cdads-second");

        let lines = sink.lines();
        assert!(lines.contains(&"cdads-first".to_string()));
        assert!(!lines.contains(&"cdads-second".to_string()));
    }

    #[test]
    fn reconnect_after_disconnect_works() {
        let first = Capture::new();
        let id = connect_sink(first.clone(), plain());
        disconnect_sink(id);

        let second = Capture::new();
        let id2 = connect_sink(second.clone(), plain());
        log(LogCategory::Kernel, LogLevel::Info, None, "radw-msg");
        disconnect_sink(id2);

        assert!(second.lines().contains(&"radw-msg".to_string()));
        assert!(!first.lines().contains(&"radw-msg".to_string()));
    }

    #[test]
    fn two_sinks_both_receive() {
        let a = Capture::new();
        let b = Capture::new();
        let ida = connect_sink(a.clone(), plain());
        let idb = connect_sink(b.clone(), plain());

        log(LogCategory::Kernel, LogLevel::Info, None, "tsbr-msg");

        disconnect_sink(ida);
        disconnect_sink(idb);
        assert!(a.lines().contains(&"tsbr-msg".to_string()));
        assert!(b.lines().contains(&"tsbr-msg".to_string()));
    }

    #[test]
    fn disconnect_unknown_id_is_harmless() {
        disconnect_sink(SinkId(u64::MAX));
    }

    #[test]
    fn category_level_prefix() {
        let sink = Capture::new();
        let mut options = plain();
        options.category_levels = true;
        let id = connect_sink(sink.clone(), options);

        log(LogCategory::Validation, LogLevel::Debug, None, "clp-msg");
        disconnect_sink(id);

        assert!(sink
            .lines()
            .iter()
            .any(|l| l == "[validation:debug] clp-msg"));
    }

    #[test]
    fn source_location_prefix() {
        let sink = Capture::new();
        let mut options = plain();
        options.source_locations = true;
        let id = connect_sink(sink.clone(), options);

        log(
            LogCategory::Kernel,
            LogLevel::Info,
            Some(("chainstate.rs", 42)),
            "slp-msg",
        );
        disconnect_sink(id);

        assert!(sink.lines().iter().any(|l| l == "[chainstate.rs:42] slp-msg"));
    }

    #[test]
    fn timestamps_prefix_lines() {
        let sink = Capture::new();
        let mut options = plain();
        options.timestamps = true;
        let id = connect_sink(sink.clone(), options);

        log(LogCategory::Kernel, LogLevel::Info, None, "tsp-msg");
        disconnect_sink(id);

        let lines = sink.lines();
        let line = lines.iter().find(|l| l.ends_with("tsp-msg")).unwrap();
        assert!(line.len() > "tsp-msg".len());
        // ISO timestamps start with the year.
        assert!(line.starts_with("20"));
    }

    #[test]
    fn disabled_category_drops_messages() {
        let sink = Capture::new();
        let id = connect_sink(sink.clone(), plain());

        disable_category(LogCategory::Bench);
        log(LogCategory::Bench, LogLevel::Info, None, "dcdm-msg");
        enable_category(LogCategory::Bench);
        log(LogCategory::Bench, LogLevel::Info, None, "dcdm-msg2");
        disconnect_sink(id);

        let lines = sink.lines();
        assert!(!lines.contains(&"dcdm-msg".to_string()));
        assert!(lines.contains(&"dcdm-msg2".to_string()));
    }

    #[test]
    fn level_filter_per_category() {
        let sink = Capture::new();
        let id = connect_sink(sink.clone(), plain());

        set_level(LogCategory::Coindb, LogLevel::Info);
        log(LogCategory::Coindb, LogLevel::Trace, None, "lfpc-trace");
        log(LogCategory::Coindb, LogLevel::Info, None, "lfpc-info");
        set_level(LogCategory::Coindb, LogLevel::Trace);
        disconnect_sink(id);

        let lines = sink.lines();
        assert!(!lines.contains(&"lfpc-trace".to_string()));
        assert!(lines.contains(&"lfpc-info".to_string()));
    }
}
