// ABOUTME: Command module aggregator for the ccdeploy CLI.
// ABOUTME: Re-exports init, check and deploy command handlers.

mod check;
mod deploy;
mod init;

pub use check::check;
pub use deploy::{DeployRequest, deploy};
pub use init::init;
