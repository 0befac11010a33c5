use std::fs;
use std::path::Path;

use dynload::{hex_dump, load_description};
use dynload_core::model::{MemberKind, Visibility};
use tempfile::tempdir;

#[test]
fn load_description_reads_yaml_fixture() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/greeter.yaml");
    let desc = load_description(&path).expect("load yaml");
    assert_eq!(desc.name, "Greeter");
    assert_eq!(desc.visibility, Visibility::Public);
    assert!(desc.member(MemberKind::Method, "greet").is_some());
}

#[test]
fn load_description_picks_json_by_extension() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("unit.JSON");
    fs::write(&path, r#"{"name": "FromJson", "visibility": "private"}"#).expect("write");
    let desc = load_description(&path).expect("load json");
    assert_eq!(desc.name, "FromJson");
    assert_eq!(desc.visibility, Visibility::Private);
    assert!(desc.members.is_empty());
}

#[test]
fn load_description_reports_missing_file() {
    let dir = tempdir().expect("tempdir");
    let err = load_description(&dir.path().join("missing.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read unit description"));
}

#[test]
fn load_description_reports_parse_errors() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "members: 3\n").expect("write");
    let err = load_description(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse unit description YAML"));
}

#[test]
fn hex_dump_formats_offsets_and_ascii() {
    let dump = hex_dump(b"DLU1\x01\x00 some more text!!");
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("00000000  44 4c 55 31 01 00 20 73"));
    assert!(lines[0].ends_with("|DLU1.. some more|"));
    assert!(lines[1].starts_with("00000010  20 74 65 78 74 21 21"));
    assert_eq!(hex_dump(&[]), "");
}
