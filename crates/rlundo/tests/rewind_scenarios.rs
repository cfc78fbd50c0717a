#![forbid(unsafe_code)]

//! Screen-level undo scenarios: session output is relayed into a virtual
//! terminal, checkpoints are taken the way the prompt loop takes them, and
//! the visible result of each restore is checked cell by cell.
//!
//! Run: `cargo test -p rlundo --test rewind_scenarios`

use rlundo_core::recorder::RecordingTerminal;
use rlundo_core::rewind::{CONTIGUITY_MARKER, RewindEngine, RewindOutcome};
use rlundo_core::virtual_terminal::{SharedTerminal, TerminalWriter};

fn session(width: u16, height: u16) -> (SharedTerminal, RecordingTerminal<TerminalWriter>) {
    let shared = SharedTerminal::new(width, height);
    let terminal = RecordingTerminal::new(shared.writer());
    (shared, terminal)
}

fn restore(
    shared: &SharedTerminal,
    terminal: &mut RecordingTerminal<TerminalWriter>,
) -> RewindOutcome {
    let extent = shared.with(|vt| vt.extent());
    terminal.restore(&mut shared.replies(), extent).unwrap()
}

/// Print `count` numbered lines straight to the screen, bypassing the recorder.
fn prefill(shared: &SharedTerminal, count: usize) {
    shared.with(|vt| {
        for i in 0..count {
            vt.feed(format!("history {i}\r\n").as_bytes());
        }
    });
}

#[test]
fn undo_erases_the_last_line_and_its_output() {
    let (shared, mut terminal) = session(80, 24);
    terminal.relay(b"banner\r\n").unwrap();

    terminal.save();
    terminal.relay(b">>> ").unwrap();
    terminal.relay(b"x = 1\r\n").unwrap();
    terminal.save();
    terminal.relay(b">>> ").unwrap();
    terminal.relay(b"undo\r\n").unwrap();

    assert_eq!(restore(&shared, &mut terminal), RewindOutcome::Rewound { lines: 2 });
    shared.with(|vt| {
        assert_eq!(vt.screen_text().trim_end(), "banner");
        assert_eq!(vt.cursor(), (0, 1));
        assert!(vt.take_replies().is_empty(), "cursor report must be consumed");
    });

    // The resumed loop prompts again on the freed row.
    terminal.save();
    terminal.relay(b">>> ").unwrap();
    shared.with(|vt| assert_eq!(vt.row_text(1), ">>>"));
}

#[test]
fn two_buffer_rewind_from_row_ten_moves_up_three_lines() {
    let (shared, mut terminal) = session(80, 24);
    prefill(&shared, 7);

    terminal.save();
    terminal.relay(b">>> print(1)\r\n1\r\n").unwrap();
    terminal.save();
    terminal.relay(b">>> undo\r\n").unwrap();
    shared.with(|vt| assert_eq!(vt.cursor(), (0, 10)));

    assert_eq!(restore(&shared, &mut terminal), RewindOutcome::Rewound { lines: 3 });
    shared.with(|vt| {
        assert_eq!(vt.cursor(), (0, 7));
        for row in 0..7 {
            assert_eq!(vt.row_text(row), format!("history {row}"));
        }
        for row in 7..24 {
            assert_eq!(vt.row_text(row), "", "row {row} should be cleared");
        }
    });
}

#[test]
fn rewind_with_cursor_mid_line_still_reaches_column_zero() {
    let (shared, mut terminal) = session(300, 10);
    terminal.save();
    terminal.relay(b">>> ").unwrap();
    terminal.relay(&[b'y'; 250]).unwrap();
    terminal.save();

    shared.with(|vt| assert_eq!(vt.char_at(253, 0), Some('y')));
    assert_eq!(restore(&shared, &mut terminal), RewindOutcome::Rewound { lines: 0 });
    shared.with(|vt| {
        assert_eq!(vt.cursor(), (0, 0));
        assert_eq!(vt.char_at(0, 0), Some(' '));
        assert_eq!(vt.char_at(253, 0), Some(' '));
    });
}

#[test]
fn rewind_past_the_top_draws_the_marker_once() {
    let (shared, mut terminal) = session(80, 10);
    terminal.save();
    for i in 0..15 {
        terminal.relay(format!("out {i}\r\n").as_bytes()).unwrap();
    }
    terminal.save();
    terminal.relay(b">>> undo\r\n").unwrap();
    let scrolled = shared.with(|vt| vt.scrollback_len());

    let outcome = restore(&shared, &mut terminal);
    assert_eq!(
        outcome,
        RewindOutcome::Overflow {
            lines: 16,
            available: Some(9)
        }
    );
    shared.with(|vt| {
        assert_eq!(vt.rows_containing(CONTIGUITY_MARKER), vec![0]);
        assert_eq!(vt.cursor(), (0, vt.extent().middle_row()));
        for row in 1..10 {
            assert_eq!(vt.row_text(row), "", "row {row} should be blank");
        }
        // Nothing was pushed into scrollback by the redraw itself.
        assert_eq!(vt.scrollback_len(), scrolled);
    });
}

#[test]
fn silent_terminal_takes_the_overflow_path() {
    let (shared, mut terminal) = session(80, 24);
    prefill(&shared, 3);
    shared.with(|vt| vt.set_reports_cursor(false));

    terminal.save();
    terminal.relay(b">>> 1\r\n1\r\n").unwrap();
    terminal.save();

    assert_eq!(
        restore(&shared, &mut terminal),
        RewindOutcome::Overflow {
            lines: 2,
            available: None
        }
    );
    shared.with(|vt| {
        assert_eq!(vt.rows_containing(CONTIGUITY_MARKER), vec![0]);
        assert!(vt.rows_containing("history").is_empty());
        assert_eq!(vt.cursor(), (0, 12));
    });
}

#[test]
fn repeated_undo_walks_back_one_prompt_at_a_time() {
    let (shared, mut terminal) = session(80, 24);

    terminal.save();
    terminal.relay(b">>> a = 1\r\n").unwrap();
    terminal.save();
    terminal.relay(b">>> b = 2\r\n").unwrap();
    terminal.save();
    terminal.relay(b">>> undo\r\n").unwrap();
    assert_eq!(restore(&shared, &mut terminal), RewindOutcome::Rewound { lines: 2 });
    shared.with(|vt| {
        assert_eq!(vt.row_text(0), ">>> a = 1");
        assert_eq!(vt.cursor(), (0, 1));
    });

    // Back at the second prompt: it saves again and the user undoes again,
    // which takes back `a = 1` as well.
    terminal.save();
    terminal.relay(b">>> undo\r\n").unwrap();
    assert_eq!(restore(&shared, &mut terminal), RewindOutcome::Rewound { lines: 2 });
    shared.with(|vt| {
        assert_eq!(vt.row_text(0), "");
        assert_eq!(vt.row_text(1), "");
        assert_eq!(vt.cursor(), (0, 0));
    });
    assert_eq!(terminal.recorder().depth(), 1);
}

#[test]
fn custom_marker_is_drawn_on_overflow() {
    let shared = SharedTerminal::new(40, 6);
    shared.with(|vt| vt.set_reports_cursor(false));
    let engine = RewindEngine::new().with_marker("-- rewound --");
    assert_eq!(engine.marker(), "-- rewound --");
    assert_eq!(RewindEngine::new().marker(), CONTIGUITY_MARKER);
    let mut terminal = RecordingTerminal::with_engine(shared.writer(), engine);
    terminal.save();
    terminal.relay(b"x\r\n").unwrap();
    terminal.save();

    assert!(restore(&shared, &mut terminal).is_overflow());
    shared.with(|vt| {
        assert_eq!(vt.row_text(0), "-- rewound --");
        assert!(vt.rows_containing(CONTIGUITY_MARKER).is_empty());
    });
}

fn two_buffer_session(cursor_row: u16) -> (SharedTerminal, RewindOutcome) {
    let (shared, mut terminal) = session(80, 24);
    terminal.save();
    terminal.relay(b"line1\nline2\n").unwrap();
    terminal.save();
    terminal.relay(b"line3\n").unwrap();
    shared.with(|vt| vt.set_cursor(0, cursor_row));
    let outcome = restore(&shared, &mut terminal);
    (shared, outcome)
}

#[test]
fn both_popped_buffers_count_toward_the_rewind() {
    let (shared, outcome) = two_buffer_session(10);
    assert_eq!(outcome, RewindOutcome::Rewound { lines: 3 });
    shared.with(|vt| {
        assert_eq!(vt.cursor(), (0, 7));
        assert!(vt.rows_containing(CONTIGUITY_MARKER).is_empty());
    });
}

#[test]
fn cursor_on_the_top_row_overflows() {
    let (shared, outcome) = two_buffer_session(0);
    assert_eq!(
        outcome,
        RewindOutcome::Overflow {
            lines: 3,
            available: Some(0)
        }
    );
    shared.with(|vt| assert_eq!(vt.rows_containing(CONTIGUITY_MARKER), vec![0]));
}
