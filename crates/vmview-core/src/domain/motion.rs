//! Pointer-motion shaping.
//!
//! Two jobs happen in front of the backend's input handling:
//!
//! 1. **Rate limiting.**  When a maximum pointer rate is configured, motion
//!    events that arrive sooner than `min_interval` after the last accepted
//!    event are dropped.
//! 2. **Warp compensation** (multichannel backend only).  In server pointer
//!    mode the display library warps the local pointer back after every
//!    accepted motion.  The motion produced by that warp only re-establishes
//!    the zero point for the next delta, so it must reach the backend even if
//!    it arrives within the interval.  Motion is therefore accepted in pairs.
//!
//! ```text
//! t:        0     5     6     20    21
//! interval: ok    -     6<10  ok    -
//! pairing:  -     yes   -     -     yes
//! verdict:  acc   acc   rej   acc   acc
//! ```
//!
//! The pairing assumes strict alternation between genuine motion and warp
//! corrections.  Two consecutive genuine events therefore lose the second one.

use crate::domain::session::BackendKind;

/// A raw pointer-motion notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEvent {
    /// Event time in milliseconds, as reported by the windowing system.
    pub timestamp_ms: u64,
    /// Pointer X position in display coordinates.
    pub x: f64,
    /// Pointer Y position in display coordinates.
    pub y: f64,
}

impl MotionEvent {
    /// Convenience constructor for an event whose position does not matter.
    pub fn at(timestamp_ms: u64) -> Self {
        Self { timestamp_ms, x: 0.0, y: 0.0 }
    }
}

/// Outcome of shaping one motion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionVerdict {
    /// Forward the event to the backend.
    Accept,
    /// Swallow the event.
    Reject,
}

/// How accepted events are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    /// Plain interval filtering.
    Plain,
    /// Interval filtering with unconditional acceptance of the event that
    /// follows every accepted one.
    WarpPaired,
}

impl From<BackendKind> for MotionMode {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Single => MotionMode::Plain,
            BackendKind::Multichannel => MotionMode::WarpPaired,
        }
    }
}

/// Converts a maximum event rate (events per second) into a minimum
/// inter-event interval in milliseconds.
///
/// `None` and `Some(0)` both mean "unlimited".
pub fn interval_for_rate(max_rate: Option<u32>) -> Option<u64> {
    match max_rate {
        Some(rate) if rate > 0 => Some(1000 / u64::from(rate)),
        _ => None,
    }
}

/// Rate limiter and warp-pairing filter for pointer motion.
#[derive(Debug, Clone)]
pub struct MotionShaper {
    mode: MotionMode,
    min_interval_ms: Option<u64>,
    last_accepted_ms: Option<u64>,
    accept_next: bool,
}

impl MotionShaper {
    /// Creates a shaper.  `min_interval_ms == None` disables shaping entirely:
    /// every event is accepted and no pairing state is kept.
    pub fn new(mode: MotionMode, min_interval_ms: Option<u64>) -> Self {
        Self {
            mode,
            min_interval_ms,
            last_accepted_ms: None,
            accept_next: false,
        }
    }

    /// Creates a shaper for a backend and an optional maximum rate.
    pub fn for_backend(kind: BackendKind, max_rate: Option<u32>) -> Self {
        Self::new(kind.into(), interval_for_rate(max_rate))
    }

    /// Decides whether `event` should reach the backend.
    pub fn filter(&mut self, event: &MotionEvent) -> MotionVerdict {
        let Some(interval) = self.min_interval_ms else {
            return MotionVerdict::Accept;
        };

        if self.accept_next {
            // Warp correction completing the pair.  Does not move the
            // interval anchor.
            self.accept_next = false;
            return MotionVerdict::Accept;
        }

        if let Some(last) = self.last_accepted_ms {
            if event.timestamp_ms < last.saturating_add(interval) {
                return MotionVerdict::Reject;
            }
        }

        self.last_accepted_ms = Some(event.timestamp_ms);
        if self.mode == MotionMode::WarpPaired {
            self.accept_next = true;
        }
        MotionVerdict::Accept
    }

    /// The configured minimum interval, if shaping is enabled.
    pub fn min_interval_ms(&self) -> Option<u64> {
        self.min_interval_ms
    }

    /// The mode this shaper runs in.
    pub fn mode(&self) -> MotionMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(shaper: &mut MotionShaper, times: &[u64]) -> Vec<MotionVerdict> {
        times
            .iter()
            .map(|&t| shaper.filter(&MotionEvent::at(t)))
            .collect()
    }

    use super::MotionVerdict::{Accept, Reject};

    #[test]
    fn test_interval_for_rate_uses_integer_division() {
        assert_eq!(interval_for_rate(Some(30)), Some(33));
        assert_eq!(interval_for_rate(Some(1000)), Some(1));
        assert_eq!(interval_for_rate(Some(2000)), Some(0));
    }

    #[test]
    fn test_interval_for_rate_zero_or_unset_means_unlimited() {
        assert_eq!(interval_for_rate(None), None);
        assert_eq!(interval_for_rate(Some(0)), None);
    }

    #[test]
    fn test_unset_interval_accepts_everything() {
        // Arrange
        let mut shaper = MotionShaper::new(MotionMode::WarpPaired, None);

        // Act
        let verdicts = run(&mut shaper, &[0, 1, 1, 2, 2]);

        // Assert
        assert!(verdicts.iter().all(|v| *v == Accept));
    }

    #[test]
    fn test_plain_mode_drops_events_inside_interval() {
        // Arrange
        let mut shaper = MotionShaper::new(MotionMode::Plain, Some(10));

        // Act
        let verdicts = run(&mut shaper, &[0, 5, 9, 10, 15, 25]);

        // Assert
        assert_eq!(verdicts, vec![Accept, Reject, Reject, Accept, Reject, Accept]);
    }

    #[test]
    fn test_warp_paired_mode_matches_reference_sequence() {
        // Arrange
        let mut shaper = MotionShaper::new(MotionMode::WarpPaired, Some(10));

        // Act
        let verdicts = run(&mut shaper, &[0, 5, 6, 20, 21]);

        // Assert
        assert_eq!(verdicts, vec![Accept, Accept, Reject, Accept, Accept]);
    }

    #[test]
    fn test_pairing_completion_does_not_move_interval_anchor() {
        // Arrange – 0 accepted, 9 is the pair, 10 is measured against 0
        let mut shaper = MotionShaper::new(MotionMode::WarpPaired, Some(10));

        // Act
        let verdicts = run(&mut shaper, &[0, 9, 10]);

        // Assert
        assert_eq!(verdicts, vec![Accept, Accept, Accept]);
    }

    #[test]
    fn test_rejected_event_does_not_arm_pairing() {
        let mut shaper = MotionShaper::new(MotionMode::WarpPaired, Some(10));
        let verdicts = run(&mut shaper, &[0, 1, 2, 3]);
        assert_eq!(verdicts, vec![Accept, Accept, Reject, Reject]);
    }

    #[test]
    fn test_first_event_is_never_a_pairing_completion() {
        // Arrange – a large first timestamp still goes through the interval check
        let mut shaper = MotionShaper::new(MotionMode::WarpPaired, Some(10));

        // Act
        let first = shaper.filter(&MotionEvent::at(1_000));
        let pair = shaper.filter(&MotionEvent::at(1_001));
        let third = shaper.filter(&MotionEvent::at(1_002));

        // Assert
        assert_eq!((first, pair, third), (Accept, Accept, Reject));
    }

    #[test]
    fn test_for_backend_selects_mode() {
        assert_eq!(
            MotionShaper::for_backend(BackendKind::Single, Some(100)).mode(),
            MotionMode::Plain
        );
        let shaper = MotionShaper::for_backend(BackendKind::Multichannel, Some(100));
        assert_eq!(shaper.mode(), MotionMode::WarpPaired);
        assert_eq!(shaper.min_interval_ms(), Some(10));
    }
}
