//! Dispatch cycle state machine
//!
//! Pure transitions in the Elm Architecture style: `transition` maps a state
//! and an event to a new state plus the effects the executor must perform.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{CycleOutcome, CycleState, Pass};
pub use transition::{transition, TransitionError};
