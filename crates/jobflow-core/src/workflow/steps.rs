//! The closed set of pipeline steps and everything keyed off a step kind.

use serde::{Deserialize, Serialize};

use crate::models::{MessageKind, StageSlot, WorkflowStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Research,
    Scoring,
    Positioning,
    ContentGeneration,
    QualityAssurance,
}

/// Static routing facts for one step kind.
#[derive(Debug, Clone, Copy)]
pub struct StepMapping {
    pub status: WorkflowStatus,
    pub request_kind: MessageKind,
    pub slot: StageSlot,
    /// Prior step outputs handed to the agent, in input order.
    pub inputs: &'static [StepKind],
}

impl StepKind {
    pub const ALL: [StepKind; 5] = [
        Self::Research,
        Self::Scoring,
        Self::Positioning,
        Self::ContentGeneration,
        Self::QualityAssurance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Scoring => "scoring",
            Self::Positioning => "positioning",
            Self::ContentGeneration => "content_generation",
            Self::QualityAssurance => "quality_assurance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn mapping(&self) -> StepMapping {
        match self {
            Self::Research => StepMapping {
                status: WorkflowStatus::Researching,
                request_kind: MessageKind::CompanyIntel,
                slot: StageSlot::Research,
                inputs: &[],
            },
            Self::Scoring => StepMapping {
                status: WorkflowStatus::Scoring,
                request_kind: MessageKind::ScoringResult,
                slot: StageSlot::Scoring,
                inputs: &[Self::Research],
            },
            Self::Positioning => StepMapping {
                status: WorkflowStatus::Positioning,
                request_kind: MessageKind::PositioningStrategy,
                slot: StageSlot::Positioning,
                inputs: &[Self::Research, Self::Scoring],
            },
            Self::ContentGeneration => StepMapping {
                status: WorkflowStatus::Generating,
                request_kind: MessageKind::ContentRequest,
                slot: StageSlot::Content,
                inputs: &[Self::Research, Self::Scoring, Self::Positioning],
            },
            Self::QualityAssurance => StepMapping {
                status: WorkflowStatus::Reviewing,
                request_kind: MessageKind::QaRequest,
                slot: StageSlot::Review,
                inputs: &[Self::ContentGeneration, Self::Scoring, Self::Positioning],
            },
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.mapping().status
    }

    pub fn request_kind(&self) -> MessageKind {
        self.mapping().request_kind
    }

    pub fn reply_kind(&self) -> MessageKind {
        self.mapping().request_kind.reply_kind()
    }

    pub fn slot(&self) -> StageSlot {
        self.mapping().slot
    }

    pub fn inputs(&self) -> &'static [StepKind] {
        self.mapping().inputs
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_only_reference_other_steps() {
        for kind in StepKind::ALL {
            assert!(!kind.inputs().contains(&kind), "{} feeds itself", kind);
        }
    }

    #[test]
    fn test_content_steps_use_request_reply_pairs() {
        assert_eq!(StepKind::ContentGeneration.request_kind(), MessageKind::ContentRequest);
        assert_eq!(StepKind::ContentGeneration.reply_kind(), MessageKind::ContentGenerated);
        assert_eq!(StepKind::QualityAssurance.reply_kind(), MessageKind::QaResult);
        assert_eq!(StepKind::Scoring.reply_kind(), MessageKind::ScoringResult);
    }

    #[test]
    fn test_round_trip_names() {
        for kind in StepKind::ALL {
            assert_eq!(StepKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(StepKind::from_str("export"), None);
        assert_eq!(StepKind::QualityAssurance.slot().input_key(), "qa_result");
    }
}
