//! Aggregate validator configuration

use crate::act_timing::{ActTimingSettings, ActTimingValidator};
use crate::continuity::{ContinuitySettings, ContinuityValidator};
use crate::dialogue::{DialogueSettings, DialogueValidator};
use crate::duplication::{DuplicationSettings, DuplicationValidator};
use crate::motif::{MotifSettings, MotifValidator};
use crate::pov::{PovSettings, PovValidator};
use crate::repetition::{RepetitionSettings, RepetitionValidator};
use crate::rhythm::{RhythmSettings, RhythmValidator};
use crate::structure::{StructureSettings, StructureValidator};
use crate::violation::ValidatorKind;
use crate::Validator;
use serde::{Deserialize, Serialize};

/// Settings for every validator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    pub pov: PovSettings,
    pub structure: StructureSettings,
    pub rhythm: RhythmSettings,
    pub dialogue: DialogueSettings,
    pub motif: MotifSettings,
    pub repetition: RepetitionSettings,
    pub duplication: DuplicationSettings,
    pub act_timing: ActTimingSettings,
    pub continuity: ContinuitySettings,
}

impl ValidatorSettings {
    /// Instantiate the validator for `kind`.
    ///
    /// Returns `None` for kinds that are not configurable validators.
    #[must_use]
    pub fn build(&self, kind: ValidatorKind) -> Option<Box<dyn Validator>> {
        let validator: Box<dyn Validator> = match kind {
            ValidatorKind::Pov => Box::new(PovValidator::new(self.pov.clone())),
            ValidatorKind::SceneStructure => {
                Box::new(StructureValidator::new(self.structure.clone()))
            }
            ValidatorKind::Rhythm => Box::new(RhythmValidator::new(self.rhythm.clone())),
            ValidatorKind::DialogueSubtext => {
                Box::new(DialogueValidator::new(self.dialogue.clone()))
            }
            ValidatorKind::MotifEvolution => Box::new(MotifValidator::new(self.motif.clone())),
            ValidatorKind::Repetition => {
                Box::new(RepetitionValidator::new(self.repetition.clone()))
            }
            ValidatorKind::Duplication => {
                Box::new(DuplicationValidator::new(self.duplication.clone()))
            }
            ValidatorKind::ActTiming => {
                Box::new(ActTimingValidator::new(self.act_timing.clone()))
            }
            ValidatorKind::Continuity => {
                Box::new(ContinuityValidator::new(self.continuity.clone()))
            }
            ValidatorKind::Generation => return None,
        };
        Some(validator)
    }

    /// Structure detector configured like the structure validator
    #[must_use]
    pub fn structure_detector(&self) -> StructureValidator {
        StructureValidator::new(self.structure.clone())
    }
}
