use figment::providers::Serialized;
use scanshot::cache::StoragePolicy;
use scanshot::cli::PolicyArg;
use scanshot::config::Config;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = figment::Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.policy, PolicyArg::Disk);
    assert_eq!(config.memory_divisor, 8);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
policy = "memory"
memory_budget = 2097152
"#,
    )
    .unwrap();

    use figment::{
        providers::{Format, Toml},
        Figment,
    };
    let figment =
        Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&config_path));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.policy, PolicyArg::Memory);
    assert_eq!(config.memory_budget, Some(2 * 1024 * 1024));
    assert_eq!(config.storage_policy(), StoragePolicy::memory(2 * 1024 * 1024));
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("SCANSHOT_MEMORY_DIVISOR", "16");

    use figment::{providers::Env, Figment};
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("SCANSHOT_").split("__"));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.memory_divisor, 16);
    assert_eq!(config.directory, None::<PathBuf>);

    std::env::remove_var("SCANSHOT_MEMORY_DIVISOR");
}

#[test]
fn test_load_from_path_reads_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let images = temp_dir.path().join("images");
    fs::write(
        &config_path,
        format!("policy = \"disk\"\ndirectory = {:?}\n", images.to_string_lossy()),
    )
    .unwrap();

    let config = Config::load_from_path(&config_path).unwrap();
    assert_eq!(config.policy, PolicyArg::Disk);
    assert_eq!(config.image_dir(), images);
    assert_eq!(config.storage_policy(), StoragePolicy::disk(&images));
}

#[test]
fn test_load_from_missing_path_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let config = Config::load_from_path(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.policy, PolicyArg::Disk);
}

#[test]
fn test_load_from_path_rejects_bad_values() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, "policy = \"cloud\"\n").unwrap();
    assert!(Config::load_from_path(&config_path).is_err());

    fs::write(&config_path, "memory_budget = 0\n").unwrap();
    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(err.to_string().contains("memory_budget"));
}

#[test]
fn test_save_then_load() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("scanshot").join("config.toml");
    let config = Config {
        policy: PolicyArg::Memory,
        memory_budget: Some(8 * 1024 * 1024),
        ..Config::default()
    };
    config.save_to(&config_path).unwrap();

    let loaded = Config::load_from_path(&config_path).unwrap();
    assert_eq!(loaded.policy, PolicyArg::Memory);
    assert_eq!(loaded.memory_budget, Some(8 * 1024 * 1024));
}
