//! Universal properties of the position algebra and the document.

use proptest::prelude::*;

use tandem::replica::LogicalClock;
use tandem::{generate_position_between, CursorMapper, Document, Identifier, NodeId, Position};

/// Editor-shaped text: printable runs with embedded newlines.
fn text_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-zA-Z0-9 .,!?\n]{0,120}").expect("valid regex")
}

/// A well-formed stored position: digits below the radix, final digit
/// non-zero (allocation never produces trailing zeros, and seeds start
/// at 1).
fn position_strategy() -> impl Strategy<Value = Position> {
    (
        proptest::collection::vec((0u32..256, 0u64..4), 0..3),
        (1u32..256, 0u64..4),
    )
        .prop_map(|(prefix, (last_digit, last_node))| {
            let mut identifiers: Vec<Identifier> = prefix
                .into_iter()
                .map(|(digit, node)| Identifier::new(digit, NodeId(node)))
                .collect();
            identifiers.push(Identifier::new(last_digit, NodeId(last_node)));
            Position::from(identifiers)
        })
}

/// Raw (line, column, char) triples folded onto whatever shape the document
/// has when each lands.
fn edit_strategy() -> impl Strategy<Value = Vec<(usize, usize, char)>> {
    proptest::collection::vec(
        (0usize..64, 0usize..64, proptest::char::range('a', 'z')),
        1..40,
    )
}

fn clamp_coords(doc: &Document, raw_line: usize, raw_col: usize) -> (usize, usize) {
    let line = raw_line % doc.lines.len() + 1;
    let col = raw_col % (doc.lines[line - 1].characters.len() + 1) + 1;
    (line, col)
}

proptest! {
    #[test]
    fn text_round_trips(text in text_strategy()) {
        let doc = Document::from_text(&text, NodeId(1));
        prop_assert_eq!(doc.to_text(), text);
    }

    #[test]
    fn allocation_is_dense(a in position_strategy(), b in position_strategy(), node in 0u64..6) {
        prop_assume!(a != b);
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let mid = generate_position_between(lo.identifiers(), hi.identifiers(), NodeId(node));
        prop_assert!(lo < mid, "{} !< {}", lo, mid);
        prop_assert!(mid < hi, "{} !< {}", mid, hi);
    }

    #[test]
    fn allocation_at_virtual_endpoints_is_ordered(p in position_strategy(), node in 0u64..6) {
        let before = generate_position_between(&[], p.identifiers(), NodeId(node));
        let after = generate_position_between(p.identifiers(), &[], NodeId(node));
        prop_assert!(before < p);
        prop_assert!(p < after);
    }

    #[test]
    fn inserts_keep_positions_unique_and_sorted(
        seed in text_strategy(),
        edits in edit_strategy(),
    ) {
        let mut doc = Document::from_text(&seed, NodeId(1));
        for (i, (raw_line, raw_col, ch)) in edits.into_iter().enumerate() {
            let (line, col) = clamp_coords(&doc, raw_line, raw_col);
            let node = NodeId(2 + (i as u64 % 3));
            let pos = doc.generate_position_at(line, col, node).expect("in range");
            doc.insert_character(ch, pos, i as u64 + 1);
        }

        let positions: Vec<&Position> = doc.flat_characters().map(|c| &c.pos).collect();
        for pair in positions.windows(2) {
            prop_assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn delete_is_idempotent(text in text_strategy(), pick in 0usize..200) {
        let mut doc = Document::from_text(&text, NodeId(1));
        let count = doc.char_count();
        prop_assume!(count > 0);

        let target = doc
            .flat_characters()
            .nth(pick % count)
            .map(|c| c.pos.clone())
            .expect("picked within count");

        doc.delete_character(&target).expect("first delete hits");
        let after_first = doc.clone();

        let second = doc.delete_character(&target);
        prop_assert_eq!(second.unwrap_err(), tandem::DocumentError::NotFound);
        prop_assert_eq!(doc, after_first);
    }

    #[test]
    fn concurrent_edit_batches_converge(
        seed in text_strategy(),
        edits in edit_strategy(),
        shuffled in any::<u64>(),
    ) {
        // stage the operation set once, against an evolving scratch replica
        let base = Document::from_text(&seed, NodeId(1));
        let mut scratch = base.clone();
        let mut ops: Vec<(char, Position, u64)> = Vec::new();
        for (i, (raw_line, raw_col, ch)) in edits.into_iter().enumerate() {
            let (line, col) = clamp_coords(&scratch, raw_line, raw_col);
            let node = NodeId(2 + (i as u64 % 3));
            let pos = scratch.generate_position_at(line, col, node).expect("in range");
            scratch.insert_character(ch, pos.clone(), i as u64 + 1);
            ops.push((ch, pos, i as u64 + 1));
        }

        // replica one: delivery in origin order
        let mut one = base.clone();
        for (ch, pos, clock) in &ops {
            one.insert_character(*ch, pos.clone(), *clock);
        }

        // replica two: a deterministic reordering of the same multiset
        let mut reordered = ops.clone();
        let n = reordered.len();
        for i in 0..n {
            let j = (shuffled as usize + i * 7) % n;
            reordered.swap(i, j);
        }
        let mut two = base;
        for (ch, pos, clock) in &reordered {
            two.insert_character(*ch, pos.clone(), *clock);
        }

        prop_assert_eq!(one.to_text(), two.to_text());
    }

    #[test]
    fn coordinates_round_trip(text in text_strategy()) {
        let doc = Document::from_text(&text, NodeId(1));
        let mapper = CursorMapper::new(&doc, NodeId(1));

        for (line_idx, line) in doc.lines.iter().enumerate() {
            for col_idx in 0..line.characters.len() {
                let (line, col) = (line_idx + 1, col_idx + 1);
                let pos = doc.find_position_at(line, col).expect("valid coords");
                let coords = mapper.to_coords(&pos);
                prop_assert_eq!((coords.line, coords.column), (line, col));
            }
        }
    }

    #[test]
    fn clock_stays_monotone(observations in proptest::collection::vec(0u64..1000, 0..30)) {
        let mut clock = LogicalClock::new();
        for remote in observations {
            let before = clock.value();
            clock.observe(remote);
            prop_assert!(clock.value() >= before);
            prop_assert!(clock.value() >= remote);

            let ticked = clock.tick();
            prop_assert!(ticked > before);
            prop_assert!(ticked > remote);
        }
    }

    #[test]
    fn newline_position_lands_between_the_split_lines(
        text in proptest::string::string_regex("[a-z]{1,20}(\n[a-z]{1,20}){0,3}").expect("valid regex"),
        raw_line in 0usize..8,
        raw_col in 0usize..24,
        node in 2u64..5,
    ) {
        let mut doc = Document::from_text(&text, NodeId(1));
        let (line, col) = clamp_coords(&doc, raw_line, raw_col);

        let pos = doc.generate_position_at(line, col, NodeId(node)).expect("in range");
        doc.insert_character('\n', pos.clone(), 99);

        let (newline_line, newline_idx) = doc
            .lines
            .iter()
            .enumerate()
            .find_map(|(li, l)| {
                l.characters
                    .iter()
                    .position(|c| c.pos == pos)
                    .map(|ci| (li, ci))
            })
            .expect("newline stored");

        // strictly after everything left on its line
        for ch in &doc.lines[newline_line].characters[..newline_idx] {
            prop_assert!(ch.pos < pos, "{} !< {}", ch.pos, pos);
        }
        // the newline terminates its line
        prop_assert_eq!(newline_idx + 1, doc.lines[newline_line].characters.len());
        // strictly before everything on the successor line
        for ch in &doc.lines[newline_line + 1].characters {
            prop_assert!(pos < ch.pos, "{} !< {}", pos, ch.pos);
        }
    }
}
