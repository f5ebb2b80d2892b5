//! Dispatch tracing infrastructure.
//!
//! The [`DispatchTracer`] trait defines hook points at the events that change
//! or reveal dispatch state: types being created, registry entries being
//! published, slots being recomputed, which path a binary operation took,
//! secondary attribute hooks firing, and call sites falling back or
//! specialising.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Does nothing (default) |
//! | [`StderrTracer`] | Human-readable log to stderr |
//! | [`ProfilingTracer`] | Counters, summarised by [`ProfilingTracer::report`] |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis |
//!
//! The runtime is shared between threads, so hooks take `&self` and
//! implementations use interior mutability.
//!
//! ```
//! use std::sync::Arc;
//! use pyrep::{ProfilingTracer, Runtime, RuntimeConfig};
//!
//! let tracer = Arc::new(ProfilingTracer::new());
//! let rt = Runtime::with_tracer(RuntimeConfig::default(), tracer.clone());
//! // ... dispatch ...
//! let report = tracer.report();
//! assert!(report.types_created > 0);
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use strum::{Display, IntoStaticStr};

use crate::{registry::RepresentationKind, slot::Slot};

/// Which candidate produced the result of a binary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize)]
pub enum DispatchPath {
    /// The type's dense binary grid.
    Grid,
    /// The left operand's forward slot.
    Forward,
    /// The right operand's reflected slot.
    Reflected,
    /// The left operand's in-place slot.
    InPlace,
    /// Every candidate declined.
    Unsupported,
}

/// Trace event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    TypeCreated {
        name: String,
        serial: u64,
    },
    RepresentationPublished {
        class: String,
        kind: RepresentationKind,
        won: bool,
    },
    SlotUpdated {
        type_name: String,
        host: String,
        slot: Slot,
        defined: bool,
    },
    BinaryDispatch {
        slot: Slot,
        path: DispatchPath,
    },
    AttributeFallback {
        type_name: String,
        name: String,
    },
    SiteFallback {
        site: &'static str,
        fallback_calls: usize,
    },
    GuardInstalled {
        site: &'static str,
        chain_len: usize,
    },
    Shutdown {
        types: usize,
    },
}

/// Trait for dispatch tracing.
///
/// All methods have default no-op implementations; implementations only
/// override the hooks they care about.
pub trait DispatchTracer: fmt::Debug + Send + Sync {
    /// Called after a guest type has been created and published.
    #[inline]
    fn on_type_created(&self, _name: &str, _serial: u64) {}

    /// Called after a registry entry was published for a first-seen host class.
    ///
    /// `won` is false when another thread published first and this thread's
    /// candidate was discarded.
    #[inline]
    fn on_representation_published(&self, _class: &str, _kind: RepresentationKind, _won: bool) {}

    /// Called when attribute assignment recomputed a slot.
    #[inline]
    fn on_slot_updated(&self, _type_name: &str, _host: &str, _slot: Slot, _defined: bool) {}

    /// Called once per binary or in-place operation with the path that answered.
    #[inline]
    fn on_binary_dispatch(&self, _slot: Slot, _path: DispatchPath) {}

    /// Called when `__getattr__` runs after `__getattribute__` reported a missing attribute.
    #[inline]
    fn on_attribute_fallback(&self, _type_name: &str, _name: &str) {}

    /// Called when a call site misses its guard chain.
    #[inline]
    fn on_site_fallback(&self, _site: &'static str, _fallback_calls: usize) {}

    /// Called when a call site appended a guard.
    #[inline]
    fn on_guard_installed(&self, _site: &'static str, _chain_len: usize) {}

    /// Called when the runtime is torn down.
    #[inline]
    fn on_shutdown(&self, _types: usize) {}
}

// ============================================================================
// NoopTracer
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl DispatchTracer for NoopTracer {}

// ============================================================================
// StderrTracer
// ============================================================================

/// Tracer that prints a human-readable log to stderr.
///
/// Output format:
/// ```text
///   +++ TYPE Vec2 #42
///   === REPR Vec2 found (won)
///   ~~~ SLOT C[instance].__add__ defined
///   --> BINARY __add__ via Reflected
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Stop logging after this many lines. None = unlimited.
    limit: Option<usize>,
    count: AtomicUsize,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracer that stops after `limit` lines.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: AtomicUsize::new(0),
        }
    }

    fn emit(&self, line: fmt::Arguments<'_>) {
        let n = self.count.fetch_add(1, Ordering::Relaxed);
        match self.limit {
            Some(limit) if n > limit => {}
            Some(limit) if n == limit => eprintln!("--- trace limit reached ({limit} lines) ---"),
            _ => eprintln!("{line}"),
        }
    }
}

impl DispatchTracer for StderrTracer {
    fn on_type_created(&self, name: &str, serial: u64) {
        self.emit(format_args!("  +++ TYPE {name} #{serial}"));
    }

    fn on_representation_published(&self, class: &str, kind: RepresentationKind, won: bool) {
        let outcome = if won { "won" } else { "lost" };
        self.emit(format_args!("  === REPR {class} {kind} ({outcome})"));
    }

    fn on_slot_updated(&self, type_name: &str, host: &str, slot: Slot, defined: bool) {
        let state = if defined { "defined" } else { "empty" };
        self.emit(format_args!("  ~~~ SLOT {type_name}[{host}].{slot} {state}"));
    }

    fn on_binary_dispatch(&self, slot: Slot, path: DispatchPath) {
        self.emit(format_args!("  --> BINARY {slot} via {path}"));
    }

    fn on_attribute_fallback(&self, type_name: &str, name: &str) {
        self.emit(format_args!("  ??? GETATTR {type_name}.{name}"));
    }

    fn on_site_fallback(&self, site: &'static str, fallback_calls: usize) {
        self.emit(format_args!("  ... SITE {site} fallback #{fallback_calls}"));
    }

    fn on_guard_installed(&self, site: &'static str, chain_len: usize) {
        self.emit(format_args!("  >>> GUARD {site} chain={chain_len}"));
    }

    fn on_shutdown(&self, types: usize) {
        self.emit(format_args!("  xxx SHUTDOWN types={types}"));
    }
}

// ============================================================================
// ProfilingTracer
// ============================================================================

/// Tracer that collects dispatch statistics.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    types_created: AtomicU64,
    found_types: AtomicU64,
    publish_races_lost: AtomicU64,
    slot_updates: AtomicU64,
    attribute_fallbacks: AtomicU64,
    site_fallbacks: AtomicU64,
    guards_installed: AtomicU64,
    binary_paths: Mutex<AHashMap<DispatchPath, u64>>,
}

/// Summary report from a [`ProfilingTracer`].
#[derive(Debug, Clone, Serialize)]
pub struct ProfilingReport {
    pub types_created: u64,
    pub found_types: u64,
    pub publish_races_lost: u64,
    pub slot_updates: u64,
    pub attribute_fallbacks: u64,
    pub site_fallbacks: u64,
    pub guards_installed: u64,
    /// Binary dispatch paths sorted by frequency (highest first).
    pub binary_paths: Vec<(DispatchPath, u64)>,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut binary_paths: Vec<_> = self.binary_paths.lock().iter().map(|(&k, &v)| (k, v)).collect();
        binary_paths.sort_by(|a, b| b.1.cmp(&a.1));
        ProfilingReport {
            types_created: self.types_created.load(Ordering::Relaxed),
            found_types: self.found_types.load(Ordering::Relaxed),
            publish_races_lost: self.publish_races_lost.load(Ordering::Relaxed),
            slot_updates: self.slot_updates.load(Ordering::Relaxed),
            attribute_fallbacks: self.attribute_fallbacks.load(Ordering::Relaxed),
            site_fallbacks: self.site_fallbacks.load(Ordering::Relaxed),
            guards_installed: self.guards_installed.load(Ordering::Relaxed),
            binary_paths,
        }
    }
}

impl DispatchTracer for ProfilingTracer {
    fn on_type_created(&self, _name: &str, _serial: u64) {
        self.types_created.fetch_add(1, Ordering::Relaxed);
    }

    fn on_representation_published(&self, _class: &str, kind: RepresentationKind, won: bool) {
        if kind == RepresentationKind::Found && won {
            self.found_types.fetch_add(1, Ordering::Relaxed);
        }
        if !won {
            self.publish_races_lost.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_slot_updated(&self, _type_name: &str, _host: &str, _slot: Slot, _defined: bool) {
        self.slot_updates.fetch_add(1, Ordering::Relaxed);
    }

    fn on_binary_dispatch(&self, _slot: Slot, path: DispatchPath) {
        *self.binary_paths.lock().entry(path).or_insert(0) += 1;
    }

    fn on_attribute_fallback(&self, _type_name: &str, _name: &str) {
        self.attribute_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn on_site_fallback(&self, _site: &'static str, _fallback_calls: usize) {
        self.site_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn on_guard_installed(&self, _site: &'static str, _chain_len: usize) {
        self.guards_installed.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Dispatch Profiling Report ===")?;
        writeln!(f, "Types created:       {}", self.types_created)?;
        writeln!(f, "Found types:         {}", self.found_types)?;
        writeln!(f, "Publish races lost:  {}", self.publish_races_lost)?;
        writeln!(f, "Slot updates:        {}", self.slot_updates)?;
        writeln!(f, "Attribute fallbacks: {}", self.attribute_fallbacks)?;
        writeln!(f, "Site fallbacks:      {}", self.site_fallbacks)?;
        writeln!(f, "Guards installed:    {}", self.guards_installed)?;
        writeln!(f)?;
        writeln!(f, "--- Binary Dispatch Paths ---")?;
        for (path, count) in &self.binary_paths {
            writeln!(f, "  {path:<12} {count:>10}")?;
        }
        Ok(())
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

/// Tracer that records every event in order.
///
/// The most expensive tracer (allocates per event); use it for tests and for
/// debugging specific dispatch decisions.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<TraceEvent>>,
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Mutex::new(Vec::with_capacity(limit.min(1024))),
            limit: Some(limit),
        }
    }

    /// A snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn record(&self, event: TraceEvent) {
        let mut events = self.events.lock();
        if self.limit.is_none_or(|limit| events.len() < limit) {
            events.push(event);
        }
    }
}

impl DispatchTracer for RecordingTracer {
    fn on_type_created(&self, name: &str, serial: u64) {
        self.record(TraceEvent::TypeCreated {
            name: name.to_owned(),
            serial,
        });
    }

    fn on_representation_published(&self, class: &str, kind: RepresentationKind, won: bool) {
        self.record(TraceEvent::RepresentationPublished {
            class: class.to_owned(),
            kind,
            won,
        });
    }

    fn on_slot_updated(&self, type_name: &str, host: &str, slot: Slot, defined: bool) {
        self.record(TraceEvent::SlotUpdated {
            type_name: type_name.to_owned(),
            host: host.to_owned(),
            slot,
            defined,
        });
    }

    fn on_binary_dispatch(&self, slot: Slot, path: DispatchPath) {
        self.record(TraceEvent::BinaryDispatch { slot, path });
    }

    fn on_attribute_fallback(&self, type_name: &str, name: &str) {
        self.record(TraceEvent::AttributeFallback {
            type_name: type_name.to_owned(),
            name: name.to_owned(),
        });
    }

    fn on_site_fallback(&self, site: &'static str, fallback_calls: usize) {
        self.record(TraceEvent::SiteFallback { site, fallback_calls });
    }

    fn on_guard_installed(&self, site: &'static str, chain_len: usize) {
        self.record(TraceEvent::GuardInstalled { site, chain_len });
    }

    fn on_shutdown(&self, types: usize) {
        self.record(TraceEvent::Shutdown { types });
    }
}
