use pgbackrest_core::ini::{parse_ini, render_ini, Ini, IniValue};

#[test]
fn parse_then_render_round_trips_values() {
    let text = "[db]\ndb-id=1\ndb-version=14\n\n[backrest]\nbackrest-format=5\n";
    let ini = parse_ini(text).unwrap();

    assert_eq!(ini.get("db", "db-id").unwrap().as_scalar(), Some("1"));
    assert_eq!(ini.get("backrest", "backrest-format").unwrap().as_scalar(), Some("5"));

    let rendered = render_ini(&ini);
    let reparsed = parse_ini(&rendered).unwrap();
    assert_eq!(reparsed.get("db", "db-version").unwrap().as_scalar(), Some("14"));
}

#[test]
fn malformed_line_without_equals_errors() {
    assert!(parse_ini("[db]\nnotakeyvalue\n").is_err());
}

#[test]
fn key_outside_any_section_errors() {
    assert!(parse_ini("db-id=1\n").is_err());
}

#[test]
fn set_then_remove_drops_the_key() {
    let mut ini = Ini::new();
    ini.set("db", "db-id", IniValue::Scalar("2".to_string()));
    assert!(ini.get("db", "db-id").is_ok());

    ini.remove("db", "db-id");
    assert!(ini.get("db", "db-id").is_err());
}

#[test]
fn section_list_reports_every_section_once() {
    let ini = parse_ini("[a]\nx=1\n\n[b]\ny=2\n").unwrap();
    let mut sections = ini.section_list();
    sections.sort();
    assert_eq!(sections, vec!["a", "b"]);
}
