use std::env;
use std::fs;
use tempfile::TempDir;
use treewatch::Settings;

#[test]
fn test_env_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    fs::write(
        &config_path,
        "[watcher]\nactivation_timeout_ms = 100\n\n[logging]\ndefault = \"info\"\n",
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("TW_WATCHER__ACTIVATION_TIMEOUT_MS", "777");
        env::set_var("TW_LOGGING__DEFAULT", "debug");
    }

    let settings = Settings::load_from(&config_path);

    unsafe {
        env::remove_var("TW_WATCHER__ACTIVATION_TIMEOUT_MS");
        env::remove_var("TW_LOGGING__DEFAULT");
    }

    let settings = settings.unwrap();
    assert_eq!(settings.watcher.activation_timeout_ms, 777);
    assert_eq!(settings.logging.default, "debug");
}
