// ABOUTME: Check command implementation.
// ABOUTME: Loads and validates the config, then prints the resolved step plan.

use ccdeploy::config::Config;
use ccdeploy::error::Result;
use ccdeploy::orchestrator::{StepPlan, Vars};
use ccdeploy::output::Output;

pub fn check(config: &Config, output: Output) -> Result<()> {
    let plan = StepPlan::from_config(config)?;
    // Placeholders stay visible so the plan shows what each attempt fills in.
    let unresolved = Vars::new();

    output.progress(&format!(
        "{} step(s), default target {}, {} attempt(s) per call",
        plan.steps().len(),
        config.target,
        config.retry.max_attempts
    ));

    for (i, step) in plan.steps().iter().enumerate() {
        let command = step.command.render(&unresolved);
        let timeout = step.timeout.unwrap_or(config.command_timeout);
        output.progress(&format!(
            "  {}. {} [{}] {} (timeout {})",
            i + 1,
            step.name,
            step.target,
            command.command_line(),
            humantime_serde::re::humantime::format_duration(timeout)
        ));
        if let Some(capture) = &step.capture {
            output.progress(&format!("       captures {{{}}} after {:?}", capture.var, capture.after));
        }
        if let Some(undo) = &step.compensation {
            output.progress(&format!("       compensate: {}", undo.render(&unresolved).command_line()));
        }
    }

    output.success("Configuration is valid");
    Ok(())
}
