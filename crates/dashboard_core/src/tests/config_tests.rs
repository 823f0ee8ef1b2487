use super::*;

fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key| {
        pairs
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.to_string())
    }
}

#[test]
fn defaults_apply_without_file_or_env() {
    assert_eq!(from_sources(None, env_of(&[])), Settings::default());
}

#[test]
fn file_values_override_defaults() {
    let file = r#"
        database_url = "./local/sales.db"
        completion_model = "gpt-4o-mini"
        page_size = 25
    "#;
    let settings = from_sources(Some(file), env_of(&[]));
    assert_eq!(settings.database_url, "sqlite://./local/sales.db");
    assert_eq!(settings.completion_model, "gpt-4o-mini");
    assert_eq!(settings.page_size, 25);
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn prefixed_env_wins_over_plain_env_and_file() {
    let file = r#"database_url = "sqlite://file.db""#;
    let settings = from_sources(
        Some(file),
        env_of(&[
            ("DATABASE_URL", "sqlite://plain.db"),
            ("APP__DATABASE_URL", "sqlite://prefixed.db"),
            ("OPENAI_API_KEY", "sk-plain"),
            ("RUST_LOG", "debug"),
        ]),
    );
    assert_eq!(settings.database_url, "sqlite://prefixed.db");
    assert_eq!(settings.openai_api_key.as_deref(), Some("sk-plain"));
    assert_eq!(settings.log_filter, "debug");
}

#[test]
fn invalid_page_size_keeps_previous_value() {
    let settings = from_sources(
        Some("page_size = 0"),
        env_of(&[("APP__PAGE_SIZE", "lots")]),
    );
    assert_eq!(settings.page_size, 10);
}

#[test]
fn unreadable_file_is_ignored() {
    let settings = from_sources(Some("this is = = not toml"), env_of(&[]));
    assert_eq!(settings, Settings::default());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite:x.db"), "sqlite://x.db");
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
}

#[test]
fn prepare_creates_parent_dir_for_file_database() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("data").join("sales.db");
    let raw = db_path.to_string_lossy().replace('\\', "/");

    let url = prepare_database_url(&raw).expect("prepare db url");
    assert_eq!(url, format!("sqlite://{raw}"));
    assert!(temp_root.path().join("data").exists());
}

#[test]
fn load_settings_reads_file_from_working_directory() {
    if std::env::var("APP__COMPLETION_MODEL").is_ok() {
        return;
    }
    let temp_root = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp_root.path().join(CONFIG_FILE),
        "completion_model = \"from-file\"\npage_size = 7\n",
    )
    .expect("write config");

    let previous = std::env::current_dir().expect("cwd");
    std::env::set_current_dir(temp_root.path()).expect("enter tempdir");
    let settings = load_settings();
    std::env::set_current_dir(previous).expect("restore cwd");

    assert_eq!(settings.completion_model, "from-file");
    if std::env::var("APP__PAGE_SIZE").is_err() {
        assert_eq!(settings.page_size, 7);
    }
}
