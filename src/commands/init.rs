// ABOUTME: Init command implementation.
// ABOUTME: Writes the template pipeline config into the working directory.

use ccdeploy::config;
use ccdeploy::error::Result;
use ccdeploy::output::Output;
use std::path::Path;

pub fn init(dir: &Path, force: bool, output: Output) -> Result<()> {
    let path = config::init_config(dir, force)?;
    output.success(&format!("Created {}", path.display()));
    Ok(())
}
