// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, env lookups, discovery and step plan resolution.

use ccdeploy::config::*;
use ccdeploy::error::Error;
use ccdeploy::orchestrator::StepPlan;
use std::time::Duration;

const MINIMAL: &str = r#"
steps:
  - name: install
    program: peer
    args: ["lifecycle", "chaincode", "install", "{name}_{version}.tar.gz"]
"#;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config_fills_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.target, "peer-network");
        assert_eq!(config.command_timeout, Duration::from_secs(120));
        assert_eq!(config.breaker, BreakerConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.activate_on_success);
        assert_eq!(config.subscriber_capacity, 64);
        assert_eq!(config.steps.len(), 1);
        assert_eq!(config.steps.head.name, "install");
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
target: org1-peers
command_timeout: 90s
activate_on_success: false
subscriber_capacity: 8
breaker:
  failure_threshold: 3
  success_threshold: 1
  reset_timeout: 1m
  half_open_max_calls: 2
retry:
  max_attempts: 4
  backoff:
    strategy: exponential
    base: 500ms
    max: 10s
vars:
  sequence: "2"
env:
  CORE_PEER_TLS_ENABLED: "true"
steps:
  - name: package
    program: peer
    compensate:
      program: rm
      args: ["-f", "{name}.tar.gz"]
  - name: commit
    program: peer
    target: orderer
    timeout: 5m
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.target, "org1-peers");
        assert_eq!(config.command_timeout, Duration::from_secs(90));
        assert!(!config.activate_on_success);
        assert_eq!(config.breaker.reset_timeout, Duration::from_secs(60));
        assert_eq!(
            config.retry.backoff,
            BackoffConfig::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(10),
            }
        );

        let commit = config.steps.last();
        assert_eq!(config.target_for(commit), "orderer");
        assert_eq!(commit.timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.target_for(&config.steps.head), "org1-peers");
        assert!(config.steps.head.compensate.is_some());
    }

    #[test]
    fn fixed_backoff() {
        let yaml = format!("retry:\n  backoff:\n    strategy: fixed\n    delay: 2s\n{MINIMAL}");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.retry.backoff,
            BackoffConfig::Fixed {
                delay: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn empty_step_list_is_rejected() {
        let err = Config::from_yaml("steps: []").unwrap_err();
        assert!(err.to_string().contains("at least one step"));
    }

    #[test]
    fn blank_target_is_rejected() {
        let yaml = format!("target: '  '\n{MINIMAL}");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = format!("retries: 5\n{MINIMAL}");
        assert!(matches!(Config::from_yaml(&yaml), Err(Error::Yaml(_))));
    }
}

mod validation {
    use super::*;

    fn invalid(yaml: &str) -> String {
        match Config::from_yaml(yaml) {
            Err(Error::InvalidConfig(message)) => message,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn zero_failure_threshold() {
        let message = invalid(&format!("breaker:\n  failure_threshold: 0\n{MINIMAL}"));
        assert!(message.contains("failure_threshold"));
    }

    #[test]
    fn zero_attempts() {
        let message = invalid(&format!("retry:\n  max_attempts: 0\n{MINIMAL}"));
        assert!(message.contains("max_attempts"));
    }

    #[test]
    fn backoff_base_above_max() {
        let yaml = format!(
            "retry:\n  backoff:\n    strategy: exponential\n    base: 1m\n    max: 10s\n{MINIMAL}"
        );
        assert!(invalid(&yaml).contains("backoff"));
    }

    #[test]
    fn duplicate_step_names() {
        let yaml = r#"
steps:
  - name: install
    program: peer
  - name: install
    program: peer
"#;
        assert_eq!(invalid(yaml), "duplicate step name: install");
    }

    #[test]
    fn vars_cannot_shadow_builtins() {
        let yaml = format!("vars:\n  segment: mychannel\n{MINIMAL}");
        assert!(invalid(&yaml).contains("vars.segment"));
    }

    #[test]
    fn capture_cannot_shadow_builtins() {
        let yaml = r#"
steps:
  - name: install
    program: peer
    capture:
      var: version
      after: "identifier: "
"#;
        assert!(invalid(yaml).contains("shadows"));
    }

    #[test]
    fn capture_cannot_shadow_configured_vars() {
        let yaml = r#"
vars:
  package_id: "fabcar_1.0:pinned"
steps:
  - name: install
    program: peer
    capture:
      var: package_id
      after: "identifier: "
"#;
        assert_eq!(
            invalid(yaml),
            "step install: capture var package_id shadows vars.package_id"
        );
    }
}

mod env_values {
    use super::*;

    #[test]
    fn literal_and_reference_forms_parse() {
        let yaml = r#"
env:
  PLAIN: "value"
  FROM_ENV:
    env: CCDEPLOY_TEST_PEER
    default: localhost:7051
steps:
  - name: install
    program: peer
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.env["PLAIN"], EnvValue::from("value"));
        assert_eq!(
            config.env["FROM_ENV"],
            EnvValue::FromEnv {
                var: "CCDEPLOY_TEST_PEER".to_string(),
                default: Some("localhost:7051".to_string()),
            }
        );
    }

    #[test]
    fn plan_resolves_env_at_build_time() {
        let yaml = r#"
env:
  CORE_PEER_ADDRESS:
    env: CCDEPLOY_TEST_ADDRESS
  CORE_PEER_MSPCONFIGPATH: "${CCDEPLOY_TEST_HOME}/msp"
steps:
  - name: install
    program: peer
    env:
      CORE_PEER_ADDRESS: peer1:7051
"#;
        let config = Config::from_yaml(yaml).unwrap();

        temp_env::with_vars(
            [
                ("CCDEPLOY_TEST_ADDRESS", Some("peer0:7051")),
                ("CCDEPLOY_TEST_HOME", Some("/etc/fabric")),
            ],
            || {
                let plan = StepPlan::from_config(&config).unwrap();
                let env = &plan.steps()[0].command.env;
                assert_eq!(env["CORE_PEER_ADDRESS"], "peer1:7051");
                assert_eq!(env["CORE_PEER_MSPCONFIGPATH"], "/etc/fabric/msp");
            },
        );
    }

    #[test]
    fn missing_env_without_default_fails_plan() {
        let yaml = r#"
vars:
  orderer:
    env: CCDEPLOY_TEST_UNSET_ORDERER
steps:
  - name: commit
    program: peer
"#;
        let config = Config::from_yaml(yaml).unwrap();
        temp_env::with_var_unset("CCDEPLOY_TEST_UNSET_ORDERER", || {
            assert!(matches!(
                StepPlan::from_config(&config),
                Err(Error::MissingEnvVar(var)) if var == "CCDEPLOY_TEST_UNSET_ORDERER"
            ));
        });
    }
}

mod discovery {
    use super::*;
    use std::fs;

    #[test]
    fn finds_primary_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), MINIMAL).unwrap();
        assert!(Config::discover(dir.path()).is_ok());
    }

    #[test]
    fn finds_config_in_dot_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".ccdeploy")).unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME_DIR), MINIMAL).unwrap();
        assert!(Config::discover(dir.path()).is_ok());
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn init_writes_a_loadable_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_config(dir.path(), false).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::template());

        assert!(matches!(
            init_config(dir.path(), false),
            Err(Error::AlreadyExists(_))
        ));
        assert!(init_config(dir.path(), true).is_ok());
    }
}
