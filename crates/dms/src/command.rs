//! Operator commands addressed to the engine

use serde::{Deserialize, Serialize};

use crate::config::DefenseFlags;
use crate::thresholds::Thresholds;
use crate::FatigueEngine;

/// A command, as it appears in a replay stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    StartCalibration,
    AbortCalibration,
    /// The driver flagged the last alarm as a false positive
    RelaxSensitivity,
    OverrideThresholds { thresholds: Thresholds },
    SetDefenseFlags { flags: DefenseFlags },
    Reset,
}

/// Result of applying a command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub command: EngineCommand,
    /// Error message if the command was refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stored thresholds after the command
    pub thresholds: Thresholds,
}

impl CommandOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl EngineCommand {
    /// Apply the command. Refusals are reported in the outcome, never fatal.
    pub fn apply(self, engine: &mut FatigueEngine) -> CommandOutcome {
        let result = match &self {
            EngineCommand::StartCalibration => engine.start_calibration(),
            EngineCommand::AbortCalibration => engine.abort_calibration(),
            EngineCommand::RelaxSensitivity => engine.relax_sensitivity().map(|_| ()),
            EngineCommand::OverrideThresholds { thresholds } => {
                engine.override_thresholds(*thresholds)
            }
            EngineCommand::SetDefenseFlags { flags } => {
                engine.set_defense_flags(*flags);
                Ok(())
            }
            EngineCommand::Reset => {
                engine.reset();
                Ok(())
            }
        };

        CommandOutcome {
            command: self,
            error: result.err().map(|e| e.to_string()),
            thresholds: engine.thresholds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DmsConfig;

    #[test]
    fn test_parse_commands() {
        let cmd: EngineCommand = serde_json::from_str(r#"{"command":"start_calibration"}"#).unwrap();
        assert_eq!(cmd, EngineCommand::StartCalibration);

        let cmd: EngineCommand = serde_json::from_str(
            r#"{"command":"set_defense_flags","flags":{"iris_correction":true}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            EngineCommand::SetDefenseFlags {
                flags: DefenseFlags {
                    pose_compensation: true,
                    iris_correction: true,
                    dual_calibration: true,
                }
            }
        );
    }

    #[test]
    fn test_refusal_is_reported() {
        let mut engine = FatigueEngine::new(DmsConfig::default()).unwrap();
        let outcome = EngineCommand::AbortCalibration.apply(&mut engine);
        assert!(!outcome.is_ok());
        assert!(outcome.error.unwrap().contains("No calibration session"));
    }

    #[test]
    fn test_relax_changes_thresholds() {
        let mut engine = FatigueEngine::new(DmsConfig::default()).unwrap();
        let before = engine.thresholds();
        let outcome = EngineCommand::RelaxSensitivity.apply(&mut engine);
        assert!(outcome.is_ok());
        assert!(outcome.thresholds.warn_threshold > before.warn_threshold);
    }
}
