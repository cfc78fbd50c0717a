//! Property-based invariant tests for the output recorder and rewind planning.
//!
//! 1. After `k` saves (no restores) the stack depth is `k + 1`.
//! 2. A pop returns exactly the two newest intervals, oldest first.
//! 3. A pop never touches older intervals.
//! 4. Line counting agrees with a naive count.
//! 5. The normal path is chosen iff the lines fit above the cursor.
//! 6. A restore always ends in "clear to end of screen".

use proptest::prelude::*;
use rlundo_core::recorder::OutputRecorder;
use rlundo_core::rewind::{RewindEngine, RewindOutcome, count_lines};
use rlundo_core::terminal::{CursorPosition, TerminalExtent};

// ── Helpers ─────────────────────────────────────────────────────────────

fn intervals_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..12)
}

fn recorder_from(intervals: &[Vec<u8>]) -> OutputRecorder {
    let mut recorder = OutputRecorder::new();
    for (i, chunk) in intervals.iter().enumerate() {
        if i > 0 {
            recorder.save();
        }
        recorder.append(chunk);
    }
    recorder
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Depth tracks saves
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn depth_is_saves_plus_one(k in 0usize..200) {
        let mut recorder = OutputRecorder::new();
        for _ in 0..k {
            recorder.save();
        }
        prop_assert_eq!(recorder.depth(), k + 1);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2-3. Pop consumes exactly the two newest intervals
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn pop_returns_two_newest_oldest_first(intervals in intervals_strategy()) {
        let mut recorder = recorder_from(&intervals);
        let n = intervals.len();
        let expected: Vec<u8> = intervals[n.saturating_sub(2)..].concat();

        prop_assert_eq!(recorder.pop_since_last_save(), expected);
        prop_assert_eq!(recorder.depth(), n.saturating_sub(2));
        prop_assert_eq!(recorder.buffers(), &intervals[..n.saturating_sub(2)]);
    }

    #[test]
    fn repeated_pops_drain_pairwise(intervals in intervals_strategy()) {
        let mut recorder = recorder_from(&intervals);
        let mut rebuilt = Vec::new();
        while recorder.depth() > 0 {
            let mut popped = recorder.pop_since_last_save();
            popped.extend_from_slice(&rebuilt);
            rebuilt = popped;
        }
        prop_assert_eq!(rebuilt, intervals.concat());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Line counting
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn count_lines_matches_naive(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let naive = bytes.iter().filter(|&&b| b == b'\n').count();
        prop_assert_eq!(count_lines(&bytes), naive);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Path selection
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn normal_path_iff_lines_fit(lines in 0usize..300, row in 0u16..300, col in 0u16..300) {
        let outcome = RewindOutcome::plan(lines, Some(CursorPosition::new(row, col)));
        if lines <= usize::from(row) {
            prop_assert_eq!(outcome, RewindOutcome::Rewound { lines: lines as u16 });
        } else {
            prop_assert_eq!(
                outcome,
                RewindOutcome::Overflow { lines, available: Some(row) }
            );
        }
    }

    #[test]
    fn missing_cursor_always_overflows(lines in 0usize..300) {
        prop_assert!(RewindOutcome::plan(lines, None).is_overflow());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Output always ends by clearing below the cursor
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn restore_ends_with_clear_below(
        intervals in intervals_strategy(),
        row in 0u16..40,
        height in 1u16..60,
        width in 1u16..300,
    ) {
        let mut recorder = recorder_from(&intervals);
        let reply = format!("\x1b[{};1R", row + 1);
        let mut replies = reply.as_bytes();
        let mut out = Vec::new();
        RewindEngine::new()
            .restore(&mut recorder, &mut out, &mut replies, TerminalExtent::new(height, width))
            .unwrap();
        prop_assert!(out.starts_with(b"\x1b[6n"));
        prop_assert!(out.ends_with(b"\x1b[J"));
    }
}
