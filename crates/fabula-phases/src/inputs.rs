use std::collections::BTreeMap;

use fabula_interpreter::{
    CharacterProfiles, NarrativeDna, NarrativeStructure, ProductionPlan, StructuredRecord,
};
use fabula_utils::types::PhaseId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("{phase} requires the output of {dependency}, which is not available")]
    Missing { phase: PhaseId, dependency: PhaseId },

    #[error("{phase} does not depend on {dependency}")]
    NotADependency { phase: PhaseId, dependency: PhaseId },
}

/// Committed dependency outputs for one phase.
///
/// Only records of the phase's declared dependencies are accepted, so a
/// prompt can never see output it is not supposed to depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseInputs {
    phase: PhaseId,
    records: BTreeMap<PhaseId, StructuredRecord>,
}

impl PhaseInputs {
    #[must_use]
    pub fn new(phase: PhaseId) -> Self {
        Self {
            phase,
            records: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> PhaseId {
        self.phase
    }

    /// # Errors
    ///
    /// Returns `InputError::NotADependency` if `record` belongs to a phase
    /// this one does not depend on.
    pub fn insert(&mut self, record: StructuredRecord) -> Result<(), InputError> {
        let dependency = record.phase();
        if !self.phase.deps().contains(&dependency) {
            return Err(InputError::NotADependency {
                phase: self.phase,
                dependency,
            });
        }
        self.records.insert(dependency, record);
        Ok(())
    }

    /// Dependencies with no record yet, in pipeline order.
    #[must_use]
    pub fn missing(&self) -> Vec<PhaseId> {
        self.phase
            .deps()
            .iter()
            .copied()
            .filter(|dep| !self.records.contains_key(dep))
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &StructuredRecord> {
        self.records.values()
    }

    fn require(&self, dependency: PhaseId) -> Result<&StructuredRecord, InputError> {
        self.records.get(&dependency).ok_or(InputError::Missing {
            phase: self.phase,
            dependency,
        })
    }

    /// # Errors
    ///
    /// Returns `InputError::Missing` when the DNA record was not supplied.
    pub fn dna(&self) -> Result<&NarrativeDna, InputError> {
        let missing = InputError::Missing {
            phase: self.phase,
            dependency: PhaseId::DnaExtraction,
        };
        self.require(PhaseId::DnaExtraction)?
            .as_dna()
            .ok_or(missing)
    }

    /// # Errors
    ///
    /// Returns `InputError::Missing` when character profiles were not supplied.
    pub fn characters(&self) -> Result<&CharacterProfiles, InputError> {
        let missing = InputError::Missing {
            phase: self.phase,
            dependency: PhaseId::CharacterProfiles,
        };
        self.require(PhaseId::CharacterProfiles)?
            .as_characters()
            .ok_or(missing)
    }

    /// # Errors
    ///
    /// Returns `InputError::Missing` when the narrative structure was not supplied.
    pub fn structure(&self) -> Result<&NarrativeStructure, InputError> {
        let missing = InputError::Missing {
            phase: self.phase,
            dependency: PhaseId::NarrativeStructure,
        };
        self.require(PhaseId::NarrativeStructure)?
            .as_structure()
            .ok_or(missing)
    }

    /// # Errors
    ///
    /// Returns `InputError::Missing` when the production plan was not supplied.
    pub fn plan(&self) -> Result<&ProductionPlan, InputError> {
        let missing = InputError::Missing {
            phase: self.phase,
            dependency: PhaseId::ProductionPlan,
        };
        self.require(PhaseId::ProductionPlan)?
            .as_plan()
            .ok_or(missing)
    }
}
