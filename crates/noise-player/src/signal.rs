use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use lowhum_types::StopReason;

/// One-shot stop flag shared by the player, its session thread, the output
/// callback and the device watcher.
///
/// The first [`StopSignal::fire`] wins; later calls leave the recorded reason alone.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicU8>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call set the signal.
    pub fn fire(&self, reason: StopReason) -> bool {
        self.0
            .compare_exchange(0, reason.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_fired(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }

    pub fn reason(&self) -> Option<StopReason> {
        StopReason::from_u8(self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_most_once() {
        let signal = StopSignal::new();
        assert!(!signal.is_fired());
        assert_eq!(signal.reason(), None);

        let clone = signal.clone();
        assert!(clone.fire(StopReason::DeviceLost));
        assert!(!signal.fire(StopReason::Stopped));
        assert!(signal.is_fired());
        assert_eq!(signal.reason(), Some(StopReason::DeviceLost));
    }

    #[test]
    fn concurrent_fire_has_one_winner() {
        let signal = StopSignal::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = signal.clone();
                std::thread::spawn(move || s.fire(StopReason::DefaultChanged))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
