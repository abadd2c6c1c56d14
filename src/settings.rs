//! Planner settings, loadable from a TOML file.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::search::Heuristic;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Joint step of generated rotations, in degrees.
    pub step_deg: f64,
    /// Maximum number of atomic steps per generated action.
    pub action_bound: usize,
    /// Heuristic driving the generic A* search.
    pub heuristic: Heuristic,
}

impl Default for Settings {
    fn default() -> Self {
        Settings { step_deg: 90.0, action_bound: 1, heuristic: Heuristic::default() }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Settings> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        toml::from_str(&text).context("failed to parse settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings: Settings = toml::from_str("step_deg = 45.0").unwrap();
        assert_eq!(settings.step_deg, 45.0);
        assert_eq!(settings.action_bound, 1);
        assert_eq!(settings.heuristic, Heuristic::CenterDiff);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Settings>("step = 45.0").is_err());
    }

    #[test]
    fn heuristic_names_parse() {
        let settings: Settings = toml::from_str("heuristic = \"joint_diff\"").unwrap();
        assert_eq!(settings.heuristic, Heuristic::JointDiff);
    }
}
