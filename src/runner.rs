//! Sequential scenario execution and the unexpected-failure policy.
//!
//! Every step of a scenario runs even after a failure, because a later
//! validation may declare that failure expected. A scenario fails when a
//! validation verdict is negative, or when an action failed and no passing
//! validation afterwards examined it.

use std::collections::HashSet;

use serde::Serialize;
use stepchain_context::ScenarioMeta;
use stepchain_core_types::{ScenarioDef, StepKind, StepResult};
use stepchain_dispatcher::{ContextManager, Dispatcher};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: ScenarioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub steps: Vec<StepResult>,
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    fn add(&mut self, report: ScenarioReport) {
        match report.status {
            ScenarioStatus::Passed => self.passed += 1,
            ScenarioStatus::Failed => self.failed += 1,
        }
        self.reports.push(report);
    }
}

pub struct ScenarioRunner {
    dispatcher: Dispatcher,
    manager: ContextManager,
}

impl ScenarioRunner {
    pub fn new(dispatcher: Dispatcher, manager: ContextManager) -> Self {
        Self {
            dispatcher,
            manager,
        }
    }

    /// Run every scenario, optionally filtered by tag. Scenarios never share
    /// a context; each gets a fresh one and a guaranteed teardown.
    pub async fn run_all(&self, scenarios: &[ScenarioDef], tag: Option<&str>) -> RunSummary {
        let mut summary = RunSummary::default();
        for scenario in scenarios {
            if let Some(tag) = tag {
                if !scenario.tags.iter().any(|t| t == tag) {
                    continue;
                }
            }
            summary.add(self.run_scenario(scenario).await);
        }
        info!(
            passed = summary.passed,
            failed = summary.failed,
            "run finished"
        );
        summary
    }

    pub async fn run_scenario(&self, scenario: &ScenarioDef) -> ScenarioReport {
        let meta = ScenarioMeta {
            name: scenario.name.clone(),
            tags: scenario.tags.clone(),
        };
        let mut context = match self.manager.open(meta) {
            Ok(context) => context,
            Err(err) => {
                error!(scenario = %scenario.name, error = %err, "refusing to run scenario");
                return ScenarioReport {
                    name: scenario.name.clone(),
                    status: ScenarioStatus::Failed,
                    failure: Some(err.to_string()),
                    steps: vec![],
                };
            }
        };

        let mut steps = Vec::with_capacity(scenario.steps.len());
        for step in &scenario.steps {
            steps.push(self.dispatcher.execute(step, &mut context).await);
        }
        self.manager.close(context).await;

        let failure = unexpected_failure(&steps);
        let status = if failure.is_some() {
            ScenarioStatus::Failed
        } else {
            ScenarioStatus::Passed
        };
        match &failure {
            Some(reason) => error!(scenario = %scenario.name, %reason, "scenario failed"),
            None => info!(scenario = %scenario.name, steps = steps.len(), "scenario passed"),
        }

        ScenarioReport {
            name: scenario.name.clone(),
            status,
            failure,
            steps,
        }
    }
}

/// First failure that no later passing validation declared expected.
///
/// A passing validation's verdict body lists the stack indices it examined;
/// an action failure at one of those indices was anticipated by the
/// scenario's author. Failed validations are always scenario failures.
fn unexpected_failure(steps: &[StepResult]) -> Option<String> {
    let mut examined: HashSet<usize> = HashSet::new();
    for step in steps {
        if step.kind != StepKind::Validation || !step.succeeded() {
            continue;
        }
        let indices = step
            .outcome
            .body
            .as_ref()
            .and_then(|body| body.get("examined"))
            .and_then(|value| value.as_array());
        if let Some(indices) = indices {
            examined.extend(indices.iter().filter_map(|v| v.as_u64()).map(|v| v as usize));
        }
    }

    for (index, step) in steps.iter().enumerate() {
        let Some(error) = &step.outcome.error else {
            continue;
        };
        if step.kind == StepKind::Validation {
            return Some(format!("step '{}' failed: {}", step.text, error.message));
        }
        if !examined.contains(&index) {
            return Some(format!(
                "step '{}' failed unexpectedly: {}",
                step.text, error.message
            ));
        }
    }
    None
}
