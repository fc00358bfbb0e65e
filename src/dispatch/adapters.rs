//! Built-in actuator adapters
//!
//! Thin, deterministic handlers with no AI logic. Real deployments
//! register driver-backed actuators behind the same trait.

use async_trait::async_trait;

use crate::dispatch::Actuator;
use crate::turn::{ActionResult, Intent};
use crate::Result;

/// Actuator that logs the action instead of performing it
///
/// Default for kinds with no driver configured; useful for dry runs and
/// for the query kind, where "execution" is answering.
pub struct LogActuator {
    name: &'static str,
}

impl LogActuator {
    /// Log-only actuator reporting under `name`
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Actuator for LogActuator {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, intent: &Intent) -> Result<ActionResult> {
        tracing::info!(intent = %intent.summary(), "log actuator");
        Ok(ActionResult::ok(format!("logged {}", intent.summary())))
    }
}

/// OS actuator that launches applications as detached child processes
///
/// Handles `open_app`; every other OS action is reported as unsupported
/// rather than guessed at.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCommandActuator;

#[async_trait]
impl Actuator for OsCommandActuator {
    fn name(&self) -> &'static str {
        "os-command"
    }

    async fn execute(&self, intent: &Intent) -> Result<ActionResult> {
        let action = intent.text_param("action").unwrap_or_default();

        if action != "open_app" {
            return Ok(ActionResult::failed(format!(
                "the {action} action has no driver configured"
            )));
        }

        let Some(target) = intent.text_param("target") else {
            return Ok(ActionResult::failed("no application named"));
        };

        // Launch by bare program name only; paths and shell metacharacters
        // never reach the command line.
        if target.contains(['/', '\\', ';', '&', '|', '$', '`']) {
            return Ok(ActionResult::failed(format!(
                "refusing suspicious application name: {target}"
            )));
        }

        match std::process::Command::new(target).spawn() {
            Ok(child) => {
                tracing::info!(target, pid = child.id(), "application launched");
                Ok(ActionResult::ok(format!("launched {target}")))
            }
            Err(e) => Ok(ActionResult::failed(format!("could not launch {target}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::{ActionKind, ParamValue};

    #[tokio::test]
    async fn test_log_actuator_always_succeeds() {
        let actuator = LogActuator::new("test");
        let intent = Intent::new(ActionKind::Query, [("question", ParamValue::from("time"))]);

        let result = actuator.execute(&intent).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_os_actuator_rejects_suspicious_names() {
        let actuator = OsCommandActuator;
        let intent = Intent::new(
            ActionKind::OsAction,
            [
                ("action", ParamValue::from("open_app")),
                ("target", ParamValue::from("evil; rm -rf /")),
            ],
        );

        let result = actuator.execute(&intent).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_os_actuator_reports_unsupported_actions() {
        let actuator = OsCommandActuator;
        let intent = Intent::new(
            ActionKind::OsAction,
            [("action", ParamValue::from("brightness_control"))],
        );

        let result = actuator.execute(&intent).await.unwrap();
        assert!(!result.success);
        assert!(result.detail.contains("no driver"));
    }
}
