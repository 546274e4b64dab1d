use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_attempts: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self { failure_threshold: 3, reset_timeout: Duration::from_secs(30), half_open_attempts: 2 }
    }
}

struct Record {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    open_until: Option<Instant>,
}

impl Record {
    fn new() -> Self {
        Self { state: CircuitState::Closed, consecutive_failures: 0, half_open_successes: 0, open_until: None }
    }
}

/// One `Mutex`-guarded record per upstream name, matching spec §5's
/// "guarded local to each upstream's record" requirement.
pub struct CircuitBreaker {
    config: CircuitConfig,
    records: Mutex<HashMap<String, Record>>,
}

/// Whether the caller may proceed, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self { config, records: Mutex::new(HashMap::new()) }
    }

    /// Call before dispatching. A `HalfOpen` transition observed here is
    /// what admits the probing call (spec §4.4's Open-state probe rule).
    pub fn admit(&self, upstream: &str) -> Admission {
        let mut guard = self.records.lock().unwrap();
        let record = guard.entry(upstream.to_string()).or_insert_with(Record::new);

        match record.state {
            CircuitState::Closed => Admission::Admit,
            CircuitState::HalfOpen => Admission::Admit,
            CircuitState::Open => {
                let now = Instant::now();
                if record.open_until.map(|deadline| now >= deadline).unwrap_or(true) {
                    record.state = CircuitState::HalfOpen;
                    record.half_open_successes = 0;
                    Admission::Admit
                } else {
                    Admission::Reject
                }
            }
        }
    }

    /// Only transport errors, timeouts, and HTTP 5xx count as failures
    /// (spec §4.4) — the caller decides that before calling this.
    pub fn record_failure(&self, upstream: &str) {
        let mut guard = self.records.lock().unwrap();
        let record = guard.entry(upstream.to_string()).or_insert_with(Record::new);
        match record.state {
            CircuitState::Closed => {
                record.consecutive_failures += 1;
                if record.consecutive_failures >= self.config.failure_threshold {
                    record.state = CircuitState::Open;
                    record.open_until = Some(Instant::now() + self.config.reset_timeout);
                }
            }
            CircuitState::HalfOpen => {
                record.state = CircuitState::Open;
                record.open_until = Some(Instant::now() + self.config.reset_timeout);
                record.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_success(&self, upstream: &str) {
        let mut guard = self.records.lock().unwrap();
        let record = guard.entry(upstream.to_string()).or_insert_with(Record::new);
        match record.state {
            CircuitState::Closed => {
                record.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                record.half_open_successes += 1;
                if record.half_open_successes >= self.config.half_open_attempts {
                    record.state = CircuitState::Closed;
                    record.consecutive_failures = 0;
                    record.half_open_successes = 0;
                    record.open_until = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state_of(&self, upstream: &str) -> CircuitState {
        self.records.lock().unwrap().get(upstream).map(|r| r.state).unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitConfig { failure_threshold: 3, reset_timeout: Duration::from_millis(20), half_open_attempts: 2 })
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let cb = breaker();
        for _ in 0..3 {
            assert_eq!(cb.admit("svc"), Admission::Admit);
            cb.record_failure("svc");
        }
        assert_eq!(cb.state_of("svc"), CircuitState::Open);
        assert_eq!(cb.admit("svc"), Admission::Reject);
    }

    #[test]
    fn half_open_closes_after_enough_successes() {
        let cb = breaker();
        for _ in 0..3 {
            cb.admit("svc");
            cb.record_failure("svc");
        }
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cb.admit("svc"), Admission::Admit);
        assert_eq!(cb.state_of("svc"), CircuitState::HalfOpen);
        cb.record_success("svc");
        assert_eq!(cb.state_of("svc"), CircuitState::HalfOpen);
        cb.record_success("svc");
        assert_eq!(cb.state_of("svc"), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker();
        for _ in 0..3 {
            cb.admit("svc");
            cb.record_failure("svc");
        }
        std::thread::sleep(Duration::from_millis(25));
        cb.admit("svc");
        cb.record_failure("svc");
        assert_eq!(cb.state_of("svc"), CircuitState::Open);
    }

    #[test]
    fn success_in_closed_state_resets_failure_count() {
        let cb = breaker();
        cb.admit("svc");
        cb.record_failure("svc");
        cb.record_failure("svc");
        cb.record_success("svc");
        cb.record_failure("svc");
        cb.record_failure("svc");
        assert_eq!(cb.state_of("svc"), CircuitState::Closed);
    }
}
