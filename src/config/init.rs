// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented ccdeploy.yml describing the Fabric peer lifecycle pipeline.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

/// Write the template config into `dir`, returning the path written.
pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, template_yaml())?;

    Ok(config_path)
}

/// YAML form of `Config::template()`, with comments.
pub(super) fn template_yaml() -> &'static str {
    r#"# Default downstream target; each target gets its own circuit breaker.
target: peer-network
command_timeout: 2m

# Promote to active once every step succeeds, deprecating the previous active version.
activate_on_success: true

# Events buffered per progress subscriber before it starts missing them.
subscriber_capacity: 64

breaker:
  failure_threshold: 5
  success_threshold: 2
  reset_timeout: 30s
  half_open_max_calls: 1

retry:
  max_attempts: 3
  backoff:
    strategy: exponential
    base: 1s
    max: 30s

# Available to step arguments as {orderer}, {sequence}, ...
# Built-ins: {name} {version} {segment} {content} {language} {attempt}
vars:
  orderer: { env: ORDERER_ADDRESS, default: "localhost:7050" }
  sequence: "1"

env:
  CORE_PEER_ADDRESS: { env: CORE_PEER_ADDRESS, default: "localhost:7051" }

steps:
  - name: package
    program: peer
    args: [lifecycle, chaincode, package, "{name}_{version}.tar.gz", --path, "{content}", --lang, "{language}", --label, "{name}_{version}"]
    compensate:
      program: rm
      args: [-f, "{name}_{version}.tar.gz"]

  - name: install
    program: peer
    args: [lifecycle, chaincode, install, "{name}_{version}.tar.gz"]
    timeout: 5m
    capture:
      var: package_id
      after: "Chaincode code package identifier: "

  - name: approve-for-org
    program: peer
    args: [lifecycle, chaincode, approveformyorg, -o, "{orderer}", --channelID, "{segment}", --name, "{name}", --version, "{version}", --package-id, "{package_id}", --sequence, "{sequence}"]

  - name: commit
    program: peer
    args: [lifecycle, chaincode, commit, -o, "{orderer}", --channelID, "{segment}", --name, "{name}", --version, "{version}", --sequence, "{sequence}"]
"#
}
