//! Conversation phases and the legal edges between them.
//!
//! The dispatch loop moves between these phases:
//! - AwaitInput -> Chatter
//! - Chatter -> AwaitInput (small talk answered) | FaqCheck
//! - FaqCheck -> BackendQuery | AwaitInput | Done
//! - BackendQuery -> ViabilityCheck
//! - ViabilityCheck -> IuChoice | ViabilityCheck | Chatter | AwaitInput | Done
//! - IuChoice -> ViabilityCheck | Chatter | IuChoice | AwaitInput | Done
//!
//! `AwaitInput` and `Done` are reached from the answer-offering phases
//! through the end-of-conversation sub-dialogue.

use std::fmt;

use tracing::error;

use crate::error::DialogError;

/// A phase of the conversation, with the data it needs to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Wait for the next utterance. `keep_state` carries context and
    /// candidates over instead of starting fresh.
    AwaitInput { keep_state: bool },
    Chatter,
    FaqCheck,
    BackendQuery,
    /// Offer a winner if there is one. `came_from_back` marks entry from a
    /// clarification branch.
    ViabilityCheck { came_from_back: bool },
    IuChoice,
    Done,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::AwaitInput { .. } => PhaseKind::AwaitInput,
            Phase::Chatter => PhaseKind::Chatter,
            Phase::FaqCheck => PhaseKind::FaqCheck,
            Phase::BackendQuery => PhaseKind::BackendQuery,
            Phase::ViabilityCheck { .. } => PhaseKind::ViabilityCheck,
            Phase::IuChoice => PhaseKind::IuChoice,
            Phase::Done => PhaseKind::Done,
        }
    }
}

/// Phase without its payload; what transitions are validated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    AwaitInput,
    Chatter,
    FaqCheck,
    BackendQuery,
    ViabilityCheck,
    IuChoice,
    Done,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::AwaitInput => "AwaitInput",
            PhaseKind::Chatter => "Chatter",
            PhaseKind::FaqCheck => "FaqCheck",
            PhaseKind::BackendQuery => "BackendQuery",
            PhaseKind::ViabilityCheck => "ViabilityCheck",
            PhaseKind::IuChoice => "IuChoice",
            PhaseKind::Done => "Done",
        };
        f.write_str(name)
    }
}

impl PhaseKind {
    /// Returns whether a transition from `self` to `target` is legal.
    pub fn can_transition_to(&self, target: &PhaseKind) -> bool {
        use PhaseKind::*;
        matches!(
            (self, target),
            (AwaitInput, Chatter)
                | (Chatter, AwaitInput)
                | (Chatter, FaqCheck)
                | (FaqCheck, BackendQuery)
                | (FaqCheck, AwaitInput)
                | (FaqCheck, Done)
                | (BackendQuery, ViabilityCheck)
                | (ViabilityCheck, IuChoice)
                | (ViabilityCheck, ViabilityCheck)
                | (ViabilityCheck, Chatter)
                | (ViabilityCheck, AwaitInput)
                | (ViabilityCheck, Done)
                | (IuChoice, ViabilityCheck)
                | (IuChoice, Chatter)
                | (IuChoice, IuChoice)
                | (IuChoice, AwaitInput)
                | (IuChoice, Done)
        )
    }
}

/// Check a single step of the dispatch loop.
pub fn validate_transition(from: PhaseKind, to: PhaseKind) -> Result<(), DialogError> {
    if from.can_transition_to(&to) {
        Ok(())
    } else {
        Err(DialogError::InvalidTransition(from, to))
    }
}

/// Halt the session on a broken orchestration invariant.
///
/// These are programming defects, never conversational conditions, so the
/// session task panics after the fault is logged.
#[track_caller]
pub fn invariant_violated(what: impl fmt::Display) -> ! {
    error!(fault = %what, "Orchestration invariant violated");
    panic!("orchestration invariant violated: {what}");
}

// =============================================================================
// Tests
// =============================================================================
