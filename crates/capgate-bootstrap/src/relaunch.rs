//! Executing a [`RelaunchPlan`].

use std::process::Command;

use crate::error::ProvisioningError;
use crate::plan::RelaunchPlan;

/// Starts the provisioned replacement process.
///
/// Returns the exit code the current process should exit with. An
/// implementation that replaces the process image does not return on success.
pub trait Relauncher {
    /// Run `plan`.
    fn relaunch(&self, plan: &RelaunchPlan) -> Result<i32, ProvisioningError>;
}

/// Relaunches via the operating system.
///
/// On Unix the process image is replaced (`exec`), so stdio and the process
/// id carry over. Elsewhere the plan runs as a child and its exit code is
/// returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecRelauncher;

impl Relauncher for ExecRelauncher {
    fn relaunch(&self, plan: &RelaunchPlan) -> Result<i32, ProvisioningError> {
        let mut command = Command::new(&plan.program);
        command.args(&plan.args);
        command.envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        tracing::info!(command = %plan.command_line(), "relaunching with provisioned dependencies");

        let failed = |source: std::io::Error| ProvisioningError::Relaunch {
            program: plan.program.clone(),
            source,
        };

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            Err(failed(command.exec()))
        }

        #[cfg(not(unix))]
        {
            let status = command.status().map_err(failed)?;
            Ok(status.code().unwrap_or(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_relaunch_error() {
        let plan = RelaunchPlan {
            program: "/nonexistent/capgate-provisioner".into(),
            args: vec!["run".into()],
            env: Vec::new(),
        };
        let err = ExecRelauncher.relaunch(&plan).unwrap_err();
        assert!(matches!(err, ProvisioningError::Relaunch { .. }));
        assert!(err.to_string().contains("/nonexistent/capgate-provisioner"), "{err}");
    }
}
