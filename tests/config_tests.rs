use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tgtag::config::{generate::generate_starter_config, load_config, ConfigError};

#[test]
fn test_generated_config_loads_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, generate_starter_config()).unwrap();

    let config = load_config(&config_path).expect("Generated config should be valid");

    assert_eq!(config.writer.batch_size, 10);
    assert_eq!(config.writer.flush_period, Duration::from_secs(2));
    assert_eq!(config.pipeline.filenames_buffer, 2);
    assert!(!config.system.data_path.to_string_lossy().starts_with('~'));
}

// Each test sets its own variable and never removes it, so parallel tests
// cannot observe each other's environment changes.
#[test]
fn test_env_var_expansion_in_paths() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    std::env::set_var("TGTAG_IT_DATA_ROOT", "/srv/archives");
    fs::write(
        &config_path,
        "system:\n  data_path: $env{TGTAG_IT_DATA_ROOT}/tg\nstore:\n  path: /tmp/tgtag.duckdb\n",
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.system.data_path.to_string_lossy(), "/srv/archives/tg");
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = load_config(&temp_dir.path().join("absent.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
    assert!(err.to_string().contains("absent.yml"));
}

#[test]
fn test_malformed_yaml_names_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.yml");
    fs::write(&config_path, "system: [unterminated").unwrap();

    let err = load_config(&config_path).unwrap_err();
    assert!(err.to_string().contains("broken.yml"));
}
