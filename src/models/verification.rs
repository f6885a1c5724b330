// src/models/verification.rs
//! Verification report returned by the BlockCerts verifier.
//!
//! An invalid credential is a valid answer: failures are reported here with
//! per-step diagnostics instead of being raised as errors.

use serde::{Deserialize, Serialize};

/// Outcome of a whole verification or of a single step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Skipped,
}

/// Diagnostic for one verification step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStep {
    pub code: String,
    pub label: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Full verification report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub steps: Vec<VerificationStep>,
}

impl VerifyResult {
    /// Builds the report from its steps; the first failing step decides the outcome.
    pub fn from_steps(steps: Vec<VerificationStep>) -> Self {
        match steps.iter().find(|s| s.status == Status::Failure) {
            Some(failed) => VerifyResult {
                status: Status::Failure,
                error_message: Some(format!(
                    "{}: {}",
                    failed.label,
                    failed.error_message.clone().unwrap_or_default()
                )),
                steps,
            },
            None => VerifyResult {
                status: Status::Success,
                error_message: None,
                steps,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Looks up a step by code.
    pub fn step(&self, code: &str) -> Option<&VerificationStep> {
        self.steps.iter().find(|s| s.code == code)
    }
}
