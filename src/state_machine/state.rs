//! Cycle state types

use crate::llm::LlmErrorKind;
use crate::transcript::ToolRequest;

/// Which generation pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Over the transcript ending in the user turn
    Initial,
    /// Over the transcript ending in the tool results
    Final,
}

impl Pass {
    pub fn as_str(self) -> &'static str {
        match self {
            Pass::Initial => "initial",
            Pass::Final => "final",
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A final assistant turn was appended and committed
    Completed { message_id: String, content: String },
    /// Generation finished with nothing to say; appended turns were committed
    Empty,
    /// The model could not be reached; the transcript was rolled back
    Failed { kind: LlmErrorKind, message: String },
    /// The consumer went away; the transcript was rolled back
    Cancelled,
    /// The runtime hit a state it cannot continue from; rolled back
    Internal { message: String },
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Completed { .. } => "completed",
            CycleOutcome::Empty => "empty",
            CycleOutcome::Failed { .. } => "failed",
            CycleOutcome::Cancelled => "cancelled",
            CycleOutcome::Internal { .. } => "internal",
        }
    }
}

/// Dispatch cycle state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CycleState {
    /// Ready for a user turn
    #[default]
    AwaitingInput,

    /// First generation pass in flight
    GeneratingInitial,

    /// Running the requested tools one at a time, in request order
    ExecutingTools {
        /// Assistant turn that requested the tools
        message_id: String,
        current: ToolRequest,
        remaining: Vec<ToolRequest>,
    },

    /// Second generation pass in flight
    GeneratingFinal,

    /// Cycle finished; no further events are accepted
    Terminal { outcome: CycleOutcome },
}

impl CycleState {
    /// Whether the cycle has started and not yet finished
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            CycleState::GeneratingInitial
                | CycleState::ExecutingTools { .. }
                | CycleState::GeneratingFinal
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleState::Terminal { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            CycleState::AwaitingInput => "awaiting_input",
            CycleState::GeneratingInitial => "generating_initial",
            CycleState::ExecutingTools { .. } => "executing_tools",
            CycleState::GeneratingFinal => "generating_final",
            CycleState::Terminal { .. } => "terminal",
        }
    }
}
