use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct BreakerState {
  consecutive_failures: u32,
  opened_at: Option<Instant>,
}

/// Trips after `threshold` consecutive upstream failures; while open, calls
/// fail fast for `cooldown`, after which a trial call is allowed through.
#[derive(Debug)]
pub struct CircuitBreaker {
  threshold: u32,
  cooldown: Duration,
  state: Mutex<BreakerState>,
  opens: AtomicU64,
}

impl CircuitBreaker {
  #[must_use]
  pub fn new(threshold: u32, cooldown: Duration) -> Self {
    Self {
      threshold: threshold.max(1),
      cooldown,
      state: Mutex::new(BreakerState {
        consecutive_failures: 0,
        opened_at: None,
      }),
      opens: AtomicU64::new(0),
    }
  }

  /// Whether a call may proceed right now.
  #[must_use]
  pub fn allows_call(&self) -> bool {
    let state = self.state.lock();
    match state.opened_at {
      Some(opened_at) => opened_at.elapsed() >= self.cooldown,
      None => true,
    }
  }

  pub fn record_success(&self) {
    let mut state = self.state.lock();
    state.consecutive_failures = 0;
    state.opened_at = None;
  }

  pub fn record_failure(&self) {
    let mut state = self.state.lock();
    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    if state.consecutive_failures >= self.threshold {
      let was_closed = state
        .opened_at
        .is_none_or(|opened_at| opened_at.elapsed() >= self.cooldown);
      if was_closed {
        self.opens.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
          consecutive_failures = state.consecutive_failures,
          "embedding circuit breaker opened"
        );
      }
      state.opened_at = Some(Instant::now());
    }
  }

  /// How many times the breaker has transitioned to open.
  #[must_use]
  pub fn open_count(&self) -> u64 {
    self.opens.load(Ordering::Relaxed)
  }
}
