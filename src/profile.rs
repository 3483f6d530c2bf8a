//! Process-wide timing counters, enabled by the `TRELLIS_PROFILE` env var.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Snapshot of the profiling counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileSnapshot {
    /// Nanoseconds spent compiling queries.
    pub compile_ns: u64,
    /// Queries compiled.
    pub compile_count: u64,
    /// Nanoseconds spent waiting on store round-trips.
    pub round_trip_ns: u64,
    /// Store round-trips issued.
    pub round_trip_count: u64,
    /// Tasks resolved by dispatched rounds.
    pub task_count: u64,
    /// Nanoseconds spent applying updates.
    pub update_ns: u64,
    /// Updates applied.
    pub update_count: u64,
}

#[derive(Default)]
struct Counters {
    compile_ns: AtomicU64,
    compile_count: AtomicU64,
    round_trip_ns: AtomicU64,
    round_trip_count: AtomicU64,
    task_count: AtomicU64,
    update_ns: AtomicU64,
    update_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<Counters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("TRELLIS_PROFILE").is_some())
}

fn counters() -> Option<&'static Counters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(Counters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum ProfileKind {
    Compile,
    RoundTrip { tasks: u64 },
    Update,
}

pub(crate) fn record_profile_timer(kind: ProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    match kind {
        ProfileKind::Compile => {
            counters.compile_ns.fetch_add(nanos, Ordering::Relaxed);
            counters.compile_count.fetch_add(1, Ordering::Relaxed);
        }
        ProfileKind::RoundTrip { tasks } => {
            counters.round_trip_ns.fetch_add(nanos, Ordering::Relaxed);
            counters.round_trip_count.fetch_add(1, Ordering::Relaxed);
            counters.task_count.fetch_add(tasks, Ordering::Relaxed);
        }
        ProfileKind::Update => {
            counters.update_ns.fetch_add(nanos, Ordering::Relaxed);
            counters.update_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Reads the counters, optionally resetting them.
///
/// Returns `None` unless `TRELLIS_PROFILE` was set when the process first
/// touched the counters.
///
/// ```no_run
/// if let Some(snapshot) = trellis::profile::profile_snapshot(true) {
///     println!("round trips: {}", snapshot.round_trip_count);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<ProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(ProfileSnapshot {
        compile_ns: load(&counters.compile_ns),
        compile_count: load(&counters.compile_count),
        round_trip_ns: load(&counters.round_trip_ns),
        round_trip_count: load(&counters.round_trip_count),
        task_count: load(&counters.task_count),
        update_ns: load(&counters.update_ns),
        update_count: load(&counters.update_count),
    })
}
