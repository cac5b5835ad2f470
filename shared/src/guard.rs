use std::sync::atomic::{AtomicBool, Ordering};

/// Drop-not-queue latch: at most one holder at a time.
///
/// Callers that find the latch taken are turned away rather than waiting;
/// the next notification carries a fresher snapshot anyway.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the latch, or returns `None` if a flight is already running.
    pub fn try_enter(&self) -> Option<Flight<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Flight { latch: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the latch when dropped, whatever the outcome of the flight.
#[derive(Debug)]
pub struct Flight<'a> {
    latch: &'a AtomicBool,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.latch.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_entry_is_refused() {
        let guard = SingleFlight::new();
        let flight = guard.try_enter();
        assert!(flight.is_some());
        assert!(guard.is_busy());
        assert!(guard.try_enter().is_none());

        drop(flight);
        assert!(!guard.is_busy());
        assert!(guard.try_enter().is_some());
    }

    #[test]
    fn test_latch_released_on_panic() {
        let guard = SingleFlight::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _flight = guard.try_enter();
            panic!("cycle failed");
        }));
        assert!(result.is_err());
        assert!(!guard.is_busy());
    }
}
