//! # Settings Unit Tests / 设置单元测试

use kernel_matrix_runner::core::config::{load_settings, parse_settings, Settings, DEFAULT_TIMEOUT_SECS};
use kernel_matrix_runner::core::models::Repository;
use kernel_matrix_runner::error::ConfigError;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let settings = load_settings(&dir.path().join("Harness.toml")).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert_eq!(settings.jobs, 1);
    assert_eq!(settings.output_dir, "test_outputs");
}

#[test]
fn test_full_settings_file() {
    let content = r#"
language = "zh-CN"
project_root = "/work/triton-bench"
output_dir = "test_outputs_ablation"
timeout_secs = 600
whitelist_dir = "lists"

[env]
CUDA_VISIBLE_DEVICES = "0"

[repositories.tritonbench]
command = "python3 -u"

[repositories.flag_gems]
test_dir = "/opt/FlagGems/tests"

[overlay]
preload = true
libraries = [{ source = "/opt/sanitizer/libcuda_hook.so", alias = "libcuda.so.1" }]
"#;
    let settings = parse_settings(content, Path::new("Harness.toml")).unwrap();

    assert_eq!(settings.language.as_deref(), Some("zh-CN"));
    assert_eq!(settings.timeout().as_secs(), 600);
    assert_eq!(settings.env.get("CUDA_VISIBLE_DEVICES").map(String::as_str), Some("0"));
    assert_eq!(
        settings.whitelist_dir().unwrap(),
        PathBuf::from("/work/triton-bench/lists")
    );
    assert_eq!(settings.command(Repository::Tritonbench).unwrap(), ["python3", "-u"]);
    assert_eq!(
        settings.command(Repository::FlagGems).unwrap(),
        ["pytest", "-s", "--assert=plain"]
    );
    assert_eq!(
        settings.test_dir(Repository::FlagGems).unwrap(),
        PathBuf::from("/opt/FlagGems/tests")
    );
    assert_eq!(
        settings.test_dir(Repository::LigerKernel).unwrap(),
        PathBuf::from("/work/triton-bench/submodules/Liger-Kernel/test/transformers/")
    );
    assert_eq!(settings.overlay.search_path_var, "LD_LIBRARY_PATH");
    assert!(settings.overlay.preload);
    assert_eq!(settings.overlay.libraries[0].alias.as_deref(), Some("libcuda.so.1"));
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let err = parse_settings("timeout_secs = \"soon\"", Path::new("Harness.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Settings { .. }));
}

#[test]
fn test_zero_timeout_is_rejected() {
    let err = parse_settings("timeout_secs = 0", Path::new("Harness.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_unknown_repository_section_is_rejected() {
    let err = parse_settings("[repositories.triton]\ncommand = \"python\"", Path::new("Harness.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownRepository(ref name) if name == "triton"));
}

#[test]
fn test_repository_list_parsing() {
    assert_eq!(Repository::parse_list("all").unwrap(), Repository::ALL);
    assert_eq!(
        Repository::parse_list("tritonbench, flag_gems,tritonbench").unwrap(),
        [Repository::FlagGems, Repository::Tritonbench]
    );
    assert!(matches!(
        Repository::parse_list("liger"),
        Err(ConfigError::UnknownRepository(_))
    ));
    assert!(Repository::parse_list(" , ").is_err());
}
