// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seed data: subjects, programs, steps and enrollments loaded at startup

use cadence_core::{Enrollment, Program, Step, Subject};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid seed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid seed: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
}

impl Seed {
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        let seed: Seed = serde_json::from_str(json)?;
        seed.validate()?;
        Ok(seed)
    }

    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let json = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check references and step ordering
    pub fn validate(&self) -> Result<(), SeedError> {
        for step in &self.steps {
            step.validate()
                .map_err(|e| SeedError::Invalid(e.message))?;
            if !self.programs.iter().any(|p| p.id == step.program_id) {
                return Err(SeedError::Invalid(format!(
                    "step {} references unknown program {}",
                    step.id, step.program_id
                )));
            }
        }
        for program in &self.programs {
            let mut orders: Vec<u32> = self
                .steps
                .iter()
                .filter(|s| s.program_id == program.id)
                .map(|s| s.order)
                .collect();
            orders.sort_unstable();
            let dense = orders.iter().zip(1u32..).all(|(order, expected)| *order == expected);
            if !dense {
                return Err(SeedError::Invalid(format!(
                    "steps of program {} must be numbered 1..n, got {:?}",
                    program.id, orders
                )));
            }
        }
        for enrollment in &self.enrollments {
            if !self.subjects.iter().any(|s| s.id == enrollment.subject_id) {
                return Err(SeedError::Invalid(format!(
                    "enrollment {} references unknown subject {}",
                    enrollment.id, enrollment.subject_id
                )));
            }
            if !self.programs.iter().any(|p| p.id == enrollment.program_id) {
                return Err(SeedError::Invalid(format!(
                    "enrollment {} references unknown program {}",
                    enrollment.id, enrollment.program_id
                )));
            }
            if enrollment.completed_steps > enrollment.total_steps {
                return Err(SeedError::Invalid(format!(
                    "enrollment {} has more completed steps than steps",
                    enrollment.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "seed_tests.rs"]
mod tests;
