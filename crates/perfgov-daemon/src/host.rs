//! Host-side metrics: main-loop tick rate and `sysinfo`-backed hardware
//! headroom.

use std::sync::{Arc, Mutex};

use perfgov_control::SlidingWindow;
use perfgov_core::{
    Clock, GovernorError, GovernorResult, HardwareStatus, MetricsProvider, lock_or_recover,
};
use sysinfo::System;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
pub const DEFAULT_RATE_WINDOW_MS: u64 = 5_000;
const DEFAULT_TICK_CAPACITY: usize = 512;

/// Counts main-loop ticks and reports ticks per second over a trailing
/// window. Reports an error until one full window has been observed.
pub struct TickRateMeter {
    clock: Arc<dyn Clock>,
    window_ms: u64,
    state: Mutex<MeterState>,
}

struct MeterState {
    first_tick_ms: Option<u64>,
    ticks: SlidingWindow,
}

impl std::fmt::Debug for TickRateMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickRateMeter")
            .field("window_ms", &self.window_ms)
            .finish_non_exhaustive()
    }
}

impl TickRateMeter {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_window(clock, DEFAULT_RATE_WINDOW_MS, DEFAULT_TICK_CAPACITY)
    }

    #[must_use]
    pub fn with_window(clock: Arc<dyn Clock>, window_ms: u64, capacity: usize) -> Self {
        Self {
            clock,
            window_ms: window_ms.max(1),
            state: Mutex::new(MeterState {
                first_tick_ms: None,
                ticks: SlidingWindow::with_capacity(capacity),
            }),
        }
    }

    pub fn record_tick(&self) {
        let now = self.clock.now_ms();
        let mut state = lock_or_recover(&self.state);
        state.first_tick_ms.get_or_insert(now);
        state.ticks.record(now);
    }

    /// Ticks per second over the trailing window.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::SamplingFailed`] while the meter is warming up.
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> GovernorResult<f64> {
        let now = self.clock.now_ms();
        let state = lock_or_recover(&self.state);
        let observed_for = state
            .first_tick_ms
            .map_or(0, |first| now.saturating_sub(first));
        if observed_for < self.window_ms {
            return Err(GovernorError::SamplingFailed {
                signal: "rate",
                source: format!(
                    "tick meter warming up ({observed_for}ms of {}ms observed)",
                    self.window_ms
                )
                .into(),
            });
        }
        let count = state.ticks.count_within(now, self.window_ms);
        Ok(count as f64 * 1_000.0 / self.window_ms as f64)
    }
}

/// [`MetricsProvider`] for a process hosting the governor in-process.
pub struct HostMetricsProvider {
    ticks: Arc<TickRateMeter>,
    system: Mutex<System>,
    process_memory_limit_gb: f64,
}

impl std::fmt::Debug for HostMetricsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMetricsProvider")
            .field("ticks", &self.ticks)
            .field("process_memory_limit_gb", &self.process_memory_limit_gb)
            .finish_non_exhaustive()
    }
}

impl HostMetricsProvider {
    /// `process_memory_limit_gb` is the process's memory budget; `0` means
    /// the process may use all free system memory.
    #[must_use]
    pub fn new(ticks: Arc<TickRateMeter>, process_memory_limit_gb: f64) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            ticks,
            system: Mutex::new(system),
            process_memory_limit_gb,
        }
    }

    #[must_use]
    pub fn ticks(&self) -> &Arc<TickRateMeter> {
        &self.ticks
    }
}

impl MetricsProvider for HostMetricsProvider {
    fn current_rate(&self) -> GovernorResult<f64> {
        self.ticks.rate()
    }

    #[allow(clippy::cast_precision_loss)]
    fn hardware_readings(&self) -> GovernorResult<HardwareStatus> {
        let mut system = lock_or_recover(&self.system);
        system.refresh_memory();
        if system.total_memory() == 0 {
            return Err(hardware_error("memory statistics unavailable on this platform"));
        }
        let free_system_memory_gb = system.available_memory() as f64 / BYTES_PER_GB;

        let free_process_memory_gb = if self.process_memory_limit_gb > 0.0 {
            let pid = sysinfo::get_current_pid().map_err(hardware_error)?;
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
            let rss_bytes = system
                .process(pid)
                .map(sysinfo::Process::memory)
                .ok_or_else(|| hardware_error("current process not visible to sysinfo"))?;
            (self.process_memory_limit_gb - rss_bytes as f64 / BYTES_PER_GB).max(0.0)
        } else {
            free_system_memory_gb
        };
        drop(system);

        let cores = std::thread::available_parallelism().map_err(|error| {
            GovernorError::SamplingFailed {
                signal: "hardware",
                source: Box::new(error),
            }
        })?;

        Ok(HardwareStatus {
            free_process_memory_gb,
            free_system_memory_gb,
            available_cores: u32::try_from(cores.get()).unwrap_or(u32::MAX),
        })
    }
}

fn hardware_error(reason: &str) -> GovernorError {
    GovernorError::SamplingFailed {
        signal: "hardware",
        source: reason.into(),
    }
}
