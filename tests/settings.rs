use macrotrack::config::Settings;
use macrotrack::persist::PersistenceMode;

#[test]
fn defaults_apply_without_a_settings_file() {
    let settings = Settings::load("no_such_macrotrack_settings").expect("settings");
    assert_eq!(settings.iterate_threshold, 200);
    assert_eq!(Settings::default().database, ":memory:");
    assert_eq!(Settings::default().persistence_mode(), PersistenceMode::InMemory);
}

#[test]
fn settings_file_overrides_defaults() {
    let path = std::env::temp_dir().join("macrotrack_settings_test.toml");
    std::fs::write(&path, "database = \"food.db\"\niterate_threshold = 50\n").expect("write settings");
    let settings = Settings::load(&path.to_string_lossy()).expect("settings");
    let _ = std::fs::remove_file(&path);
    assert_eq!(settings.database, "food.db");
    assert_eq!(settings.iterate_threshold, 50);
    assert_eq!(settings.log_filter, "info");
    assert_eq!(settings.persistence_mode(), PersistenceMode::File(String::from("food.db")));
}
