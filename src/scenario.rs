//! Scenario file loading.
//!
//! A scenario file is YAML, holding either one scenario or a list of them:
//!
//! ```yaml
//! name: user lookup
//! tags: [smoke]
//! steps:
//!   - role: when
//!     text: I GET https://jsonplaceholder.typicode.com/users/1
//!   - role: then
//!     text: the response status code should be 200
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use stepchain_core_types::ScenarioDef;

#[derive(Deserialize)]
#[serde(untagged)]
enum ScenarioFile {
    Many(Vec<ScenarioDef>),
    One(ScenarioDef),
}

pub fn load_file(path: &Path) -> Result<Vec<ScenarioDef>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario file {}", path.display()))?;
    parse(&content).with_context(|| format!("in scenario file {}", path.display()))
}

pub fn parse(content: &str) -> Result<Vec<ScenarioDef>> {
    let file: ScenarioFile = serde_yaml::from_str(content).context("parsing scenario YAML")?;
    let scenarios = match file {
        ScenarioFile::Many(scenarios) => scenarios,
        ScenarioFile::One(scenario) => vec![scenario],
    };
    for scenario in &scenarios {
        if scenario.name.trim().is_empty() {
            bail!("scenario without a name");
        }
        if scenario.steps.is_empty() {
            bail!("scenario '{}' has no steps", scenario.name);
        }
    }
    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepchain_core_types::StepRole;

    #[test]
    fn single_scenario_with_structured_payload() {
        let scenarios = parse(
            r#"
name: create post
steps:
  - role: when
    text: I GET https://api.example.com/users/1
  - role: and
    text: I create a post for that user
    payload:
      method: POST
      endpoint: https://api.example.com/posts
      body:
        userId: "${response.id}"
  - role: then
    text: the response status code should be 201
"#,
        )
        .unwrap();

        assert_eq!(scenarios.len(), 1);
        let scenario = &scenarios[0];
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[1].role, StepRole::And);
        assert!(scenario.steps[1].payload.is_some());
    }

    #[test]
    fn list_of_scenarios() {
        let scenarios = parse(
            r#"
- name: first
  steps:
    - role: given
      text: the API is available
- name: second
  tags: [smoke]
  steps:
    - role: when
      text: I GET https://api.example.com/health
"#,
        )
        .unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[1].tags, vec!["smoke".to_string()]);
    }

    #[test]
    fn empty_steps_are_rejected() {
        let err = parse("name: empty\nsteps: []\n").unwrap_err();
        assert!(err.to_string().contains("no steps"));
    }
}
