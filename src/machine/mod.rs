//! The issuance state machine.
//!
//! The machine itself is pure: [transition] maps a state and an event to the
//! next state, [reduce] folds the event into the [MachineContext] and
//! [always] resolves the guarded transient states. [IssuanceMachine] drives
//! it, invoking the service of every state that has one and feeding the
//! outcome back in as an event. A flow stops whenever it waits for user input
//! or reaches a final state.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ErrorDetails;

pub mod context;
pub mod guards;
pub mod services;
pub mod state;

pub use context::{reduce, CredentialTypeSelection, MachineContext};
pub use guards::always;
pub use services::IssuanceServices;
pub use state::{
    transition, AddContactStep, IssuanceEvent, IssuanceState, ServiceOutput, VerifyPinStep,
};

/// Outcome of offering an event to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The state does not handle the event.
    Ignored,
    /// The event is handled without leaving the state.
    Stay,
    Goto(S),
}

/// One running issuance flow.
#[derive(Debug)]
pub struct IssuanceMachine {
    flow_id: Uuid,
    services: IssuanceServices,
    state: IssuanceState,
    context: MachineContext,
    history: Vec<IssuanceState>,
}

impl IssuanceMachine {
    pub fn new(services: IssuanceServices, context: MachineContext) -> Self {
        Self {
            flow_id: Uuid::new_v4(),
            services,
            state: IssuanceState::InitiateOid4vci,
            context,
            history: vec![IssuanceState::InitiateOid4vci],
        }
    }

    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    pub fn state(&self) -> IssuanceState {
        self.state
    }

    pub fn context(&self) -> &MachineContext {
        &self.context
    }

    /// Every state entered so far, transient ones included.
    pub fn history(&self) -> &[IssuanceState] {
        &self.history
    }

    pub fn is_done(&self) -> bool {
        self.state.is_final()
    }

    /// Run services until the flow waits for input or has ended.
    pub async fn start(&mut self) -> IssuanceState {
        info!(flow_id = %self.flow_id, "issuance flow started");
        self.settle().await;
        self.state
    }

    /// Offer a user event to the current state.
    ///
    /// Events the current state does not handle are ignored. Returns the state
    /// the flow settled in.
    pub async fn send(&mut self, event: IssuanceEvent) -> IssuanceState {
        debug!(flow_id = %self.flow_id, state = %self.state, event = event.name(), "event received");
        if self.apply(event) {
            self.settle().await;
        }
        self.state
    }

    /// Apply an event; returns whether a new state was entered.
    fn apply(&mut self, event: IssuanceEvent) -> bool {
        match transition(self.state, &event, &self.context) {
            Transition::Ignored => {
                debug!(flow_id = %self.flow_id, state = %self.state, event = event.name(), "event ignored");
                false
            }
            Transition::Stay => {
                self.context = reduce(self.context.clone(), &event);
                false
            }
            Transition::Goto(next) => {
                self.context = reduce(self.context.clone(), &event);
                self.enter(next);
                true
            }
        }
    }

    fn enter(&mut self, state: IssuanceState) {
        debug!(flow_id = %self.flow_id, from = %self.state, to = %state, "state entered");
        self.state = state;
        self.history.push(state);
        if state.is_final() {
            info!(flow_id = %self.flow_id, %state, "issuance flow ended");
        }
    }

    fn fail(&mut self, error: ErrorDetails) {
        warn!(flow_id = %self.flow_id, state = %self.state, %error, "issuance step failed");
        self.apply(IssuanceEvent::Failed(error));
    }

    async fn settle(&mut self) {
        loop {
            match always(self.state, &self.context) {
                Ok(Some(next)) => {
                    self.enter(next);
                    continue;
                }
                Ok(None) => {}
                Err(error) => {
                    self.fail(error);
                    continue;
                }
            }

            let Some(event) = self.services.invoke(self.state, &self.context).await else {
                break;
            };
            match event {
                IssuanceEvent::Failed(error) => self.fail(error),
                event => {
                    if !self.apply(event) {
                        self.fail(ErrorDetails::new(
                            "Issuance failed",
                            format!("unexpected service result in {}", self.state),
                        ));
                    }
                }
            }
        }
    }
}
