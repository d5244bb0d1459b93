use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use stepchain_core_types::ScenarioId;

use crate::stack::ResponseHistoryStack;

/// Scenario name and tags, carried for logging and reporting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScenarioMeta {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-scenario state owned by exactly one scenario run.
///
/// Created empty by the lifecycle manager before the first step and torn
/// down after the last; mutation is single-threaded within the scenario.
/// Two scenarios must never observe each other's stack or token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioContext {
    /// Unique id for this run, carried through logs and reports.
    pub run_id: ScenarioId,
    pub meta: ScenarioMeta,
    pub stack: ResponseHistoryStack,
    /// Bearer token captured from a login flow, injected into later API
    /// calls that do not set their own Authorization header.
    pub auth_token: Option<String>,
    /// Field values scraped from rendered pages (name, email, phone, ...).
    pub ui_fields: HashMap<String, String>,
}

impl ScenarioContext {
    pub fn new(meta: ScenarioMeta) -> Self {
        Self {
            run_id: ScenarioId::new(),
            meta,
            stack: ResponseHistoryStack::new(),
            auth_token: None,
            ui_fields: HashMap::new(),
        }
    }

    /// True when the context carries no residue: empty stack, no token, no
    /// captured fields. The lifecycle manager refuses to hand out anything
    /// else.
    pub fn is_pristine(&self) -> bool {
        self.stack.is_empty() && self.auth_token.is_none() && self.ui_fields.is_empty()
    }
}
