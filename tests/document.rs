//! Document behavior at the API surface: text round-trips, explicit-position
//! edits, coordinate translation, file persistence.

use std::io::Write;

use tandem::{CursorMapper, Document, DocumentError, Identifier, NodeId, Position, TextCoords};

fn node(n: u64) -> NodeId {
    NodeId(n)
}

#[test]
fn from_text_shapes() {
    let empty = Document::from_text("", node(1));
    assert_eq!(empty.lines.len(), 1);
    assert_eq!(empty.char_count(), 0);

    let single = Document::from_text("Hello", node(1));
    assert_eq!(single.lines.len(), 1);
    assert_eq!(single.lines[0].characters[0].value, 'H');

    let multi = Document::from_text("Hello\nWorld", node(1));
    assert_eq!(multi.lines.len(), 2);
    assert_eq!(multi.lines[0].characters.len(), 6);
    assert_eq!(multi.lines[0].characters[5].value, '\n');
}

#[test]
fn to_text_round_trips_edge_shapes() {
    for text in ["", "a", "\n", "\n\n", "a\n", "\nb", "héllo wörld", "a\nb\nc"] {
        let doc = Document::from_text(text, node(1));
        assert_eq!(doc.to_text(), text, "round-trip of {text:?}");
    }
}

#[test]
fn insert_at_explicit_positions() {
    let mut doc = Document::from_text("Hello", node(1));

    // before everything: digit 0 sorts ahead of the seeds starting at 1
    doc.insert_character(
        'X',
        Position::from(vec![Identifier::new(0, node(1)), Identifier::new(1, node(1))]),
        10,
    );
    assert_eq!(doc.to_text(), "XHello");

    // after everything
    doc.insert_character('!', Position::from(vec![Identifier::new(200, node(1))]), 11);
    assert_eq!(doc.to_text(), "XHello!");
}

#[test]
fn newline_split_then_merge_restores_the_line() {
    let mut doc = Document::from_text("Hello", node(1));

    let split = doc.generate_position_at(1, 4, node(1)).unwrap();
    doc.insert_character('\n', split.clone(), 10);
    assert_eq!(doc.lines.len(), 2);
    assert_eq!(doc.to_text(), "Hel\nlo");

    doc.delete_character(&split).unwrap();
    assert_eq!(doc.lines.len(), 1);
    assert_eq!(doc.to_text(), "Hello");
}

#[test]
fn deleting_every_character_leaves_one_empty_line() {
    let mut doc = Document::from_text("ab\ncd", node(1));
    let positions: Vec<Position> = doc.flat_characters().map(|c| c.pos.clone()).collect();
    for pos in &positions {
        doc.delete_character(pos).unwrap();
    }
    assert_eq!(doc.lines.len(), 1);
    assert_eq!(doc.to_text(), "");
    assert_eq!(doc.char_count(), 0);
}

#[test]
fn generate_position_between_seeded_neighbors_of_different_nodes() {
    // two peers' seeds interleave; a third peer inserts between them
    let mut doc = Document::from_text("a", node(1));
    doc.insert_character('b', Position::from(vec![Identifier::new(1, node(2))]), 1);
    assert_eq!(doc.to_text(), "ab");

    let mid = doc.generate_position_at(1, 2, node(3)).unwrap();
    doc.insert_character('x', mid, 2);
    assert_eq!(doc.to_text(), "axb");
}

#[test]
fn out_of_range_errors_carry_the_coordinates() {
    let doc = Document::from_text("ab", node(1));
    match doc.find_position_at(9, 1) {
        Err(DocumentError::OutOfRange { line, column }) => {
            assert_eq!((line, column), (9, 1));
        }
        other => panic!("expected out of range, got {other:?}"),
    }
    assert!(doc.generate_position_at(0, 1, node(1)).is_err());
    assert!(doc.generate_position_at(1, 0, node(1)).is_err());
}

#[test]
fn selection_extraction_through_the_mapper() {
    let doc = Document::from_text("fn main() {\n    body();\n}", node(1));
    let mapper = CursorMapper::new(&doc, node(1));

    let (start, end) = mapper
        .selection_range(TextCoords::new(1, 4), TextCoords::new(1, 8))
        .unwrap();
    assert_eq!(mapper.extract_text(&start, &end), "main");

    let (start, end) = mapper
        .selection_range(TextCoords::new(1, 11), TextCoords::new(2, 5))
        .unwrap();
    assert_eq!(mapper.extract_text(&start, &end), "{\n    ");
}

#[test]
fn document_survives_a_file_round_trip() {
    let text = "line one\nline two\n";
    let doc = Document::from_text(text, node(1));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(doc.to_text().as_bytes()).unwrap();

    let reloaded = std::fs::read_to_string(file.path()).unwrap();
    let redoc = Document::from_text(&reloaded, node(2));
    assert_eq!(redoc.to_text(), text);
}
