use indoc::indoc;
use kou::{compile, error::Error, is_bytecode, Options, MAGIC_NUMBER};
use pretty_assertions::assert_eq;

static SAMPLE: &str = include_str!("../bench/inputs/sample.kou");

fn sections(bytes: &[u8]) -> Vec<(u8, &[u8])> {
    let mut cursor = &bytes[8..];
    let mut sections = Vec::new();
    while let Some((&id, rest)) = cursor.split_first() {
        let (size, rest) = leb128(rest);
        let (payload, rest) = rest.split_at(size as usize);
        sections.push((id, payload));
        cursor = rest;
    }
    sections
}

fn leb128(mut bytes: &[u8]) -> (u32, &[u8]) {
    let mut result = 0;
    let mut shift = 0;
    loop {
        let (&byte, rest) = bytes.split_first().unwrap();
        bytes = rest;
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return (result, bytes);
        }
        shift += 7;
    }
}

#[test]
fn compiles_the_sample_program() {
    let bytes = compile(SAMPLE, &Options::default()).unwrap();
    assert!(is_bytecode(&bytes));
    let ids: Vec<u8> = sections(&bytes).iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, [1, 3, 5, 6, 7, 10, 11]);
}

#[test]
fn magic_number_round_trip() {
    let bytes = compile("let main = fn () int { 0 }", &Options::default()).unwrap();
    assert_eq!(bytes[..4], MAGIC_NUMBER);
    assert!(is_bytecode(&bytes));
    assert!(!is_bytecode(b"let main = fn () int { 0 }"));
    assert!(!is_bytecode(b"\0as"));
}

#[test]
fn exports_main_with_default_memory() {
    let bytes = compile("let main = fn () int { 0 }", &Options::default()).unwrap();
    let sections = sections(&bytes);

    let (_, exports) = sections.iter().find(|(id, _)| *id == 7).unwrap();
    assert_eq!(*exports, [1, 4, b'm', b'a', b'i', b'n', 0x00, 0]);

    let (_, memory) = sections.iter().find(|(id, _)| *id == 5).unwrap();
    let (count, rest) = leb128(memory);
    let (_flags, rest) = leb128(rest);
    let (minimum, rest) = leb128(rest);
    let (maximum, _) = leb128(rest);
    assert_eq!((count, minimum, maximum), (1, 2048, 2048));
}

#[test]
fn custom_export_and_memory() {
    let src = indoc! {"
        let start = fn () int { 1 }
        let main = fn () int { 2 }
    "};
    let options = Options {
        exports: vec!["start".to_owned()],
        memory_size: 1,
    };
    let bytes = compile(src, &options).unwrap();
    let sections = sections(&bytes);
    let (_, exports) = sections.iter().find(|(id, _)| *id == 7).unwrap();
    assert_eq!(*exports, [1, 5, b's', b't', b'a', b'r', b't', 0x00, 0]);
    let (_, memory) = sections.iter().find(|(id, _)| *id == 5).unwrap();
    assert_eq!(*memory, [1, 1, 16, 16]);
}

#[test]
fn parse_errors_win_over_type_errors() {
    // Both an undefined identifier and a missing `}`.
    let err = compile("let main = fn () int { nope", &Options::default()).unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "{err}");
}

#[test]
fn lexical_errors_come_first() {
    let err = compile("let main = fn () int { 1 } #", &Options::default()).unwrap_err();
    assert!(matches!(err, Error::Lex(_)), "{err}");
    assert_eq!(err.pos().map(|pos| pos.to_string()), Some("1:28".to_owned()));
}

#[test]
fn type_errors_are_reported_with_position() {
    let err = compile("let main = fn () int { undefined }", &Options::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "1:24: semantic error: found undefined identifier undefined"
    );
}

#[test]
fn codegen_errors_have_no_position() {
    let options = Options {
        exports: vec!["missing".to_owned()],
        ..Options::default()
    };
    let err = compile("let main = fn () int { 0 }", &options).unwrap_err();
    assert_eq!(err.pos(), None);
    assert_eq!(
        err.to_string(),
        "codegen error: cannot export missing: no such function"
    );
}
