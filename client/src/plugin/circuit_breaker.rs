//! Per-instance circuit breakers
//!
//! Both breakers run the same three-state machine per instance id: Closed
//! passes calls through, Open fails fast, HalfOpen admits a bounded number
//! of probes. Outcomes are reported inline by callers; the time-based
//! Open -> HalfOpen transition runs from the circuit-breaker executor's
//! `periodic_check`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use polaris_core::{CircuitBreaker, Plugin, PluginInstance};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

pub(crate) fn error_count() -> PluginInstance {
    PluginInstance::CircuitBreaker(Arc::new(ErrorCountCircuitBreaker::default()))
}

pub(crate) fn error_rate() -> PluginInstance {
    PluginInstance::CircuitBreaker(Arc::new(ErrorRateCircuitBreaker::default()))
}

/// Breaker state per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through
    Closed,
    /// Calls fail fast until the open window elapses
    Open,
    /// Bounded probes decide between reopening and closing
    HalfOpen,
}

#[derive(Debug)]
struct InstanceCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    window_total: u32,
    window_failures: u32,
    window_start: Instant,
    opened_at: Option<Instant>,
    half_open_admitted: u32,
    half_open_successes: u32,
}

impl InstanceCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            window_total: 0,
            window_failures: 0,
            window_start: Instant::now(),
            opened_at: None,
            half_open_admitted: 0,
            half_open_successes: 0,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.half_open_admitted = 0;
        self.half_open_successes = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.window_total = 0;
        self.window_failures = 0;
        self.window_start = Instant::now();
        self.opened_at = None;
    }
}

/// Shared behavior of the two breakers
struct BreakerCore {
    circuits: RwLock<HashMap<String, InstanceCircuit>>,
    open_duration: Duration,
    half_open_max_probes: u32,
    half_open_success_threshold: u32,
}

impl BreakerCore {
    fn new(open_duration: Duration, half_open_max_probes: u32, half_open_success_threshold: u32) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            open_duration,
            half_open_max_probes,
            half_open_success_threshold,
        }
    }

    fn allow(&self, instance_id: &str) -> bool {
        {
            let circuits = self.circuits.read();
            match circuits.get(instance_id) {
                None => return true,
                Some(circuit) if circuit.state == CircuitState::Closed => return true,
                Some(circuit) if circuit.state == CircuitState::Open => return false,
                _ => {}
            }
        }

        // HalfOpen: admit a bounded number of probes.
        let mut circuits = self.circuits.write();
        match circuits.get_mut(instance_id) {
            Some(circuit) if circuit.state == CircuitState::HalfOpen => {
                if circuit.half_open_admitted < self.half_open_max_probes {
                    circuit.half_open_admitted += 1;
                    true
                } else {
                    false
                }
            }
            Some(circuit) => circuit.state == CircuitState::Closed,
            None => true,
        }
    }

    /// Half-open bookkeeping shared by both breakers. Returns true when the
    /// outcome was consumed by a non-closed state.
    fn report_non_closed(
        &self,
        breaker: &str,
        circuit: &mut InstanceCircuit,
        instance_id: &str,
        success: bool,
    ) -> bool {
        match circuit.state {
            CircuitState::Open => true,
            CircuitState::HalfOpen => {
                if success {
                    circuit.half_open_successes += 1;
                    if circuit.half_open_successes >= self.half_open_success_threshold {
                        circuit.close();
                        info!(breaker, instance = instance_id, "circuit closed after probes");
                    }
                } else {
                    circuit.open();
                    warn!(breaker, instance = instance_id, "probe failed, circuit reopened");
                }
                true
            }
            CircuitState::Closed => false,
        }
    }

    fn periodic_check(&self, breaker: &str) {
        let mut circuits = self.circuits.write();
        for (instance_id, circuit) in circuits.iter_mut() {
            if circuit.state != CircuitState::Open {
                continue;
            }
            let elapsed = circuit
                .opened_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= self.open_duration {
                circuit.state = CircuitState::HalfOpen;
                circuit.half_open_admitted = 0;
                circuit.half_open_successes = 0;
                info!(breaker, instance = %instance_id, "open window elapsed, half-open");
            }
        }
    }

    fn state(&self, instance_id: &str) -> CircuitState {
        self.circuits
            .read()
            .get(instance_id)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }
}

/// Opens after a run of consecutive failures
pub struct ErrorCountCircuitBreaker {
    core: BreakerCore,
    failure_threshold: u32,
}

impl ErrorCountCircuitBreaker {
    /// Breaker with explicit thresholds
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            core: BreakerCore::new(open_duration, 3, 2),
            failure_threshold,
        }
    }

    /// Current state for one instance (monitoring/tests)
    pub fn state(&self, instance_id: &str) -> CircuitState {
        self.core.state(instance_id)
    }
}

impl Default for ErrorCountCircuitBreaker {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(30))
    }
}

impl Plugin for ErrorCountCircuitBreaker {
    fn name(&self) -> &'static str {
        "errorCount"
    }
}

impl CircuitBreaker for ErrorCountCircuitBreaker {
    fn report_outcome(&self, instance_id: &str, success: bool) {
        let mut circuits = self.core.circuits.write();
        let circuit = circuits
            .entry(instance_id.to_string())
            .or_insert_with(InstanceCircuit::new);

        if self
            .core
            .report_non_closed("errorCount", circuit, instance_id, success)
        {
            return;
        }

        if success {
            circuit.consecutive_failures = 0;
            return;
        }
        circuit.consecutive_failures += 1;
        if circuit.consecutive_failures >= self.failure_threshold {
            circuit.open();
            warn!(
                instance = instance_id,
                failures = circuit.consecutive_failures,
                "consecutive failures tripped the circuit"
            );
        }
    }

    fn allow(&self, instance_id: &str) -> bool {
        self.core.allow(instance_id)
    }

    fn periodic_check(&self) {
        self.core.periodic_check("errorCount");
    }
}

/// Opens when the windowed error rate crosses a threshold
pub struct ErrorRateCircuitBreaker {
    core: BreakerCore,
    window: Duration,
    min_requests: u32,
    rate_threshold: f64,
}

impl ErrorRateCircuitBreaker {
    /// Breaker with explicit window and rate settings
    pub fn new(
        window: Duration,
        min_requests: u32,
        rate_threshold: f64,
        open_duration: Duration,
    ) -> Self {
        Self {
            core: BreakerCore::new(open_duration, 3, 2),
            window,
            min_requests,
            rate_threshold,
        }
    }

    /// Current state for one instance (monitoring/tests)
    pub fn state(&self, instance_id: &str) -> CircuitState {
        self.core.state(instance_id)
    }
}

impl Default for ErrorRateCircuitBreaker {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 10, 0.5, Duration::from_secs(30))
    }
}

impl Plugin for ErrorRateCircuitBreaker {
    fn name(&self) -> &'static str {
        "errorRate"
    }
}

impl CircuitBreaker for ErrorRateCircuitBreaker {
    fn report_outcome(&self, instance_id: &str, success: bool) {
        let mut circuits = self.core.circuits.write();
        let circuit = circuits
            .entry(instance_id.to_string())
            .or_insert_with(InstanceCircuit::new);

        if self
            .core
            .report_non_closed("errorRate", circuit, instance_id, success)
        {
            return;
        }

        if circuit.window_start.elapsed() >= self.window {
            circuit.window_start = Instant::now();
            circuit.window_total = 0;
            circuit.window_failures = 0;
        }
        circuit.window_total += 1;
        if !success {
            circuit.window_failures += 1;
        }

        if circuit.window_total >= self.min_requests {
            let rate = f64::from(circuit.window_failures) / f64::from(circuit.window_total);
            if rate >= self.rate_threshold {
                circuit.open();
                warn!(
                    instance = instance_id,
                    rate,
                    total = circuit.window_total,
                    "error rate tripped the circuit"
                );
            }
        }
    }

    fn allow(&self, instance_id: &str) -> bool {
        self.core.allow(instance_id)
    }

    fn periodic_check(&self) {
        self.core.periodic_check("errorRate");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn error_count_opens_after_threshold() {
        let breaker = ErrorCountCircuitBreaker::new(3, Duration::from_secs(5));

        assert!(breaker.allow("i-1"));
        breaker.report_outcome("i-1", false);
        breaker.report_outcome("i-1", false);
        assert_eq!(breaker.state("i-1"), CircuitState::Closed);

        breaker.report_outcome("i-1", false);
        assert_eq!(breaker.state("i-1"), CircuitState::Open);
        assert!(!breaker.allow("i-1"));

        // Other instances are untouched.
        assert!(breaker.allow("i-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_failure_run() {
        let breaker = ErrorCountCircuitBreaker::new(3, Duration::from_secs(5));
        breaker.report_outcome("i-1", false);
        breaker.report_outcome("i-1", false);
        breaker.report_outcome("i-1", true);
        breaker.report_outcome("i-1", false);
        breaker.report_outcome("i-1", false);
        assert_eq!(breaker.state("i-1"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_window_elapses_into_half_open_then_closes() {
        let breaker = ErrorCountCircuitBreaker::new(1, Duration::from_secs(5));
        breaker.report_outcome("i-1", false);
        assert_eq!(breaker.state("i-1"), CircuitState::Open);

        // Window not elapsed yet: periodic check leaves it open.
        tokio::time::advance(Duration::from_secs(2)).await;
        breaker.periodic_check();
        assert_eq!(breaker.state("i-1"), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(3)).await;
        breaker.periodic_check();
        assert_eq!(breaker.state("i-1"), CircuitState::HalfOpen);

        // Bounded probes are admitted, then cut off.
        assert!(breaker.allow("i-1"));
        assert!(breaker.allow("i-1"));
        assert!(breaker.allow("i-1"));
        assert!(!breaker.allow("i-1"));

        // Two probe successes close the circuit.
        breaker.report_outcome("i-1", true);
        breaker.report_outcome("i-1", true);
        assert_eq!(breaker.state("i-1"), CircuitState::Closed);
        assert!(breaker.allow("i-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_failure_reopens() {
        let breaker = ErrorCountCircuitBreaker::new(1, Duration::from_secs(5));
        breaker.report_outcome("i-1", false);
        tokio::time::advance(Duration::from_secs(5)).await;
        breaker.periodic_check();
        assert_eq!(breaker.state("i-1"), CircuitState::HalfOpen);

        breaker.report_outcome("i-1", false);
        assert_eq!(breaker.state("i-1"), CircuitState::Open);
        assert!(!breaker.allow("i-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn error_rate_needs_minimum_volume() {
        let breaker =
            ErrorRateCircuitBreaker::new(Duration::from_secs(10), 10, 0.5, Duration::from_secs(5));

        // Nine failures out of nine: under the volume floor, still closed.
        for _ in 0..9 {
            breaker.report_outcome("i-1", false);
        }
        assert_eq!(breaker.state("i-1"), CircuitState::Closed);

        breaker.report_outcome("i-1", false);
        assert_eq!(breaker.state("i-1"), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn error_rate_below_threshold_stays_closed() {
        let breaker =
            ErrorRateCircuitBreaker::new(Duration::from_secs(10), 10, 0.5, Duration::from_secs(5));

        for i in 0..20 {
            breaker.report_outcome("i-1", i % 4 != 0);
        }
        assert_eq!(breaker.state("i-1"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn error_rate_window_expires() {
        let breaker =
            ErrorRateCircuitBreaker::new(Duration::from_secs(10), 10, 0.5, Duration::from_secs(5));

        for _ in 0..8 {
            breaker.report_outcome("i-1", false);
        }
        // The old window ages out; the next outcome starts a fresh one.
        tokio::time::advance(Duration::from_secs(11)).await;
        for _ in 0..9 {
            breaker.report_outcome("i-1", false);
        }
        assert_eq!(
            breaker.state("i-1"),
            CircuitState::Closed,
            "stale failures must not count toward the new window"
        );
    }
}
