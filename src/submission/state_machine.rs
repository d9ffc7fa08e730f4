use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

/// Lifecycle of one submission attempt chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Pending,
    Built,
    Submitting,
    Expired,
    Confirmed,
    DuplicateRejected,
    TransientFailure,
    FatalFailure,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Pending => "pending",
            SubmissionState::Built => "built",
            SubmissionState::Submitting => "submitting",
            SubmissionState::Expired => "expired",
            SubmissionState::Confirmed => "confirmed",
            SubmissionState::DuplicateRejected => "duplicate_rejected",
            SubmissionState::TransientFailure => "transient_failure",
            SubmissionState::FatalFailure => "fatal_failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        SubmissionStateMachine::valid_transitions(*self).is_empty()
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition table for [`SubmissionState`].
#[derive(Debug, Clone)]
pub struct SubmissionStateMachine;

impl SubmissionStateMachine {
    pub fn valid_transitions(current: SubmissionState) -> Vec<SubmissionState> {
        use SubmissionState::*;
        match current {
            // Failures before the first handoff never reach the ledger.
            Pending => vec![Built, FatalFailure],
            // Built -> Built is a proactive rebuild at handoff.
            Built => vec![Built, Submitting, FatalFailure],
            Submitting => vec![
                Confirmed,
                Expired,
                DuplicateRejected,
                TransientFailure,
                FatalFailure,
            ],
            Expired => vec![Built, FatalFailure],
            Confirmed | DuplicateRejected | TransientFailure | FatalFailure => vec![],
        }
    }

    pub fn can_transition(from: SubmissionState, to: SubmissionState) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    pub fn transition(from: SubmissionState, to: SubmissionState) -> Result<SubmissionState> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::Internal(anyhow::anyhow!(
                "Invalid submission transition from {} to {}",
                from,
                to
            )))
        }
    }
}
