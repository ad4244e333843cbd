use pgbackrest_core::config::{self, Command};

#[test]
fn repo_ls_resolves_without_a_stanza() {
    let resolved = config::parse(&["repo-ls".to_string()]).unwrap();
    assert_eq!(resolved.command, Command::RepoLs);
    assert_eq!(resolved.get("repo-type").and_then(|v| v.as_str()), Some("posix"));
}

#[test]
fn command_line_value_beats_config_file_default() {
    let args: Vec<String> = vec!["check".into(), "--stanza=main".into(), "--buffer-size=2097152".into()];
    let resolved = config::parse(&args).unwrap();
    assert_eq!(resolved.get("buffer-size").and_then(|v| v.as_int()), Some(2_097_152));
}

#[test]
fn negated_boolean_option_resolves_to_none() {
    let args: Vec<String> = vec!["check".into(), "--stanza=main".into(), "--no-archive-async".into()];
    let resolved = config::parse(&args).unwrap();
    assert!(resolved.get("archive-async").is_none());
}

#[test]
fn dependent_option_without_its_depend_errors() {
    let args: Vec<String> = vec!["check".into(), "--stanza=main".into(), "--spool-path=/var/spool".into()];
    let err = config::parse(&args).unwrap_err();
    assert_eq!(err.message, "option 'spool-path' not valid without option 'archive-async'");
}

#[test]
fn help_short_circuits_before_any_stanza_requirement() {
    let resolved = config::parse(&["help".to_string()]).unwrap();
    assert_eq!(resolved.command, Command::Help);
}

#[test]
fn unknown_command_is_rejected() {
    assert!(config::parse(&["not-a-real-command".to_string()]).is_err());
}
