//! Integration tests for pointer-motion shaping through the public API.

use vmview_core::{BackendKind, MotionEvent, MotionShaper, MotionVerdict};

fn verdicts(shaper: &mut MotionShaper, times: &[u64]) -> Vec<MotionVerdict> {
    times.iter().map(|&t| shaper.filter(&MotionEvent::at(t))).collect()
}

#[test]
fn test_multichannel_backend_pairs_warp_corrections() {
    // Arrange – max rate 100/s ⇒ 10 ms interval
    let mut shaper = MotionShaper::for_backend(BackendKind::Multichannel, Some(100));

    // Act
    let result = verdicts(&mut shaper, &[0, 5, 6, 20, 21]);

    // Assert
    use MotionVerdict::{Accept, Reject};
    assert_eq!(result, vec![Accept, Accept, Reject, Accept, Accept]);
}

#[test]
fn test_single_backend_filters_same_sequence_without_pairing() {
    let mut shaper = MotionShaper::for_backend(BackendKind::Single, Some(100));

    let result = verdicts(&mut shaper, &[0, 5, 6, 20, 21]);

    use MotionVerdict::{Accept, Reject};
    assert_eq!(result, vec![Accept, Reject, Reject, Accept, Reject]);
}

#[test]
fn test_zero_rate_disables_shaping() {
    let mut shaper = MotionShaper::for_backend(BackendKind::Multichannel, Some(0));

    let result = verdicts(&mut shaper, &[0, 0, 0, 1]);

    assert!(result.iter().all(|v| *v == MotionVerdict::Accept));
    assert_eq!(shaper.min_interval_ms(), None);
}

#[test]
fn test_consecutive_genuine_events_lose_the_third() {
    // Strict alternation is assumed: with a 10 ms interval, a burst of
    // genuine events keeps only the first and the one paired with it.
    let mut shaper = MotionShaper::for_backend(BackendKind::Multichannel, Some(100));

    let accepted = verdicts(&mut shaper, &[100, 101, 102, 103, 104])
        .into_iter()
        .filter(|v| *v == MotionVerdict::Accept)
        .count();

    assert_eq!(accepted, 2);
}
