use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_spacedist_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("SPACEDIST__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = NodeConfig::default();

    assert_eq!(config.cluster.name, "spacedist");
    assert_eq!(config.cluster.local_instance, None);
    assert_eq!(config.retry.coordination_read.max_attempts, 20);
    assert_eq!(config.retry.mapping_lookup.delay_ms, 100);
    assert_eq!(config.region.wait_timeout_ms, 30_000);
    assert_eq!(config.partitioner.min_merge_size, 2);
    assert_eq!(config.coordination.dispatch_mode, DispatchMode::Background);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_spacedist_env_vars();
    with_vars(
        vec![
            ("SPACEDIST__CLUSTER__NAME", Some("prod")),
            ("SPACEDIST__REGION__WAIT_TIMEOUT_MS", Some("250")),
            ("SPACEDIST__PARTITIONER__TARGET_CELL_COUNT", Some("64")),
        ],
        || {
            let config = NodeConfig::new().unwrap();

            assert_eq!(config.cluster.name, "prod");
            assert_eq!(config.cluster.root_path(), "/prod");
            assert_eq!(config.region.wait_timeout_ms, 250);
            assert_eq!(config.partitioner.target_cell_count, 64);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_spacedist_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [cluster]
        local_instance = "10.0.0.7:50505"

        [retry.coordination_read]
        max_attempts = 5
        delay_ms = 10

        [partitioner]
        sample_fraction = 0.25
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = NodeConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap()
            .validate()
            .unwrap();

        let local = config.cluster.local_instance_addr().unwrap();
        assert_eq!(local.to_string(), "10.0.0.7:50505");
        assert_eq!(config.retry.coordination_read, RetryPolicy::new(5, 10));
        // untouched sibling keeps its default
        assert_eq!(config.retry.mapping_lookup.max_attempts, 10);
        assert_eq!(config.partitioner.sample_fraction, 0.25);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_spacedist_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [cluster]
        name = "from-file"
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("SPACEDIST__CLUSTER__NAME", Some("from-env")),
        ],
        || {
            let config = NodeConfig::new().unwrap();
            assert_eq!(config.cluster.name, "from-env");
        },
    );
}

#[test]
#[serial]
fn missing_config_file_should_fail() {
    cleanup_all_spacedist_env_vars();
    with_vars(
        vec![("CONFIG_PATH", Some("/definitely/not/here/spacedist.toml"))],
        || {
            assert!(NodeConfig::new().is_err());
        },
    );
}

#[test]
fn validation_should_reject_malformed_cluster_name() {
    let mut config = NodeConfig::default();
    config.cluster.name = "a/b".to_string();

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_malformed_local_instance() {
    let mut config = NodeConfig::default();
    config.cluster.local_instance = Some("no-port-here".to_string());

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_storage_directory_that_is_a_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut config = NodeConfig::default();
    config.cluster.storage_directories = vec![file.path().to_path_buf()];

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_zero_retry_attempts() {
    let mut config = NodeConfig::default();
    config.retry.mapping_lookup.max_attempts = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_out_of_range_partitioner_knobs() {
    let mut config = NodeConfig::default();
    config.partitioner.sample_fraction = 0.0;
    assert!(config.clone().validate().is_err());

    config.partitioner.sample_fraction = 1.0;
    config.partitioner.min_merge_size = 1;
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_queue_size_for_inline_dispatch() {
    let mut config = NodeConfig::default();
    config.coordination.dispatch_mode = DispatchMode::Inline;
    config.coordination.dispatch_queue_size = 8;

    assert!(config.validate().is_err());
}

#[test]
fn retry_policy_should_stop_on_non_retryable_error() {
    let mut calls = 0;
    let result: crate::Result<()> = RetryPolicy::new(5, 0).run("test", || {
        calls += 1;
        Err(crate::Error::Fatal("boom".into()))
    });

    assert!(result.is_err());
    assert_eq!(calls, 1);
}

#[test]
fn retry_policy_should_retry_transient_errors_until_success() {
    let mut calls = 0;
    let result = RetryPolicy::new(5, 1).run("test", || {
        calls += 1;
        if calls < 3 {
            Err(crate::CoordinationError::Unavailable("down".into()).into())
        } else {
            Ok(calls)
        }
    });

    assert_eq!(result.unwrap(), 3);
}

#[test]
fn retry_policy_should_return_last_error_on_exhaustion() {
    let mut calls = 0;
    let result: crate::Result<()> = RetryPolicy::new(4, 0).run("test", || {
        calls += 1;
        Err(crate::CoordinationError::NotFound {
            path: "/x".into(),
        }
        .into())
    });

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(calls, 4);
}
