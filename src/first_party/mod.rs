//! First-party (SIOP) authorization challenge flow.
//!
//! Some issuers grant an authorization code only after the wallet presented
//! a credential. The flow calls the authorization challenge endpoint; on
//! `insufficient_authorization` it fetches the issuer's presentation request,
//! lets the user pick credentials, posts the presentation and retries the
//! challenge once with the resulting session.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    core::response::AuthorizationCodeResponse,
    error::ErrorDetails,
    machine::Transition,
    provider::presentation::{CredentialSelector, Selection},
};

pub mod services;
pub mod state;

pub use services::FirstPartyServices;
pub use state::{
    reduce, transition, FirstPartyContext, FirstPartyEvent, FirstPartyOutput, FirstPartyState,
};

/// How a first-party flow ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstPartyCompletion {
    Code(AuthorizationCodeResponse),
    Aborted,
    Declined,
}

/// An interpreter for one first-party flow.
#[derive(Debug)]
pub struct FirstPartyMachine {
    flow_id: Uuid,
    services: FirstPartyServices,
    state: FirstPartyState,
    context: FirstPartyContext,
    history: Vec<FirstPartyState>,
}

impl FirstPartyMachine {
    pub fn new(services: FirstPartyServices, context: FirstPartyContext) -> Self {
        Self {
            flow_id: Uuid::new_v4(),
            services,
            state: FirstPartyState::SendAuthorizationChallengeRequest,
            context,
            history: vec![FirstPartyState::SendAuthorizationChallengeRequest],
        }
    }

    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    pub fn state(&self) -> FirstPartyState {
        self.state
    }

    pub fn context(&self) -> &FirstPartyContext {
        &self.context
    }

    /// Every state entered so far, the initial one included.
    pub fn history(&self) -> &[FirstPartyState] {
        &self.history
    }

    /// Run services until the flow waits for input or has ended.
    pub async fn start(&mut self) -> FirstPartyState {
        self.settle().await;
        self.state
    }

    pub async fn send(&mut self, event: FirstPartyEvent) -> FirstPartyState {
        if self.apply(event) {
            self.settle().await;
        }
        self.state
    }

    /// Drive the flow to its end, asking `selector` for the credentials to present.
    pub async fn run(
        mut self,
        selector: &dyn CredentialSelector,
    ) -> Result<FirstPartyCompletion, ErrorDetails> {
        self.start().await;
        loop {
            match self.state {
                FirstPartyState::Done => {
                    return self
                        .context
                        .authorization_code_response
                        .clone()
                        .map(FirstPartyCompletion::Code)
                        .ok_or_else(|| {
                            ErrorDetails::new(
                                "Authorization challenge failed",
                                "the flow completed without an authorization code",
                            )
                        })
                }
                FirstPartyState::Aborted => return Ok(FirstPartyCompletion::Aborted),
                FirstPartyState::Declined => return Ok(FirstPartyCompletion::Declined),
                FirstPartyState::Error => {
                    return Err(self.context.error.clone().unwrap_or_else(|| {
                        ErrorDetails::new("Authorization challenge failed", "unknown error")
                    }))
                }
                FirstPartyState::SelectCredentials => {
                    let Some(request) = self.context.authorization_request_data.clone() else {
                        return Err(ErrorDetails::new(
                            "Selecting credentials failed",
                            "missing authorization request",
                        ));
                    };
                    let selection = selector.select(&request).await.map_err(|error| {
                        ErrorDetails::from_error("Selecting credentials failed", &error)
                    })?;
                    match selection {
                        Selection::Selected(credentials) => {
                            self.send(FirstPartyEvent::SetSelectedCredentials(
                                credentials.into_inner(),
                            ))
                            .await;
                            self.send(FirstPartyEvent::Next).await;
                        }
                        Selection::Previous => {
                            self.send(FirstPartyEvent::Previous).await;
                        }
                        Selection::Decline => {
                            self.send(FirstPartyEvent::Decline).await;
                        }
                    }
                }
                state => {
                    return Err(ErrorDetails::new(
                        "Authorization challenge failed",
                        format!("the flow stalled in {state}"),
                    ))
                }
            }
        }
    }

    /// Apply an event; returns whether a new state was entered.
    fn apply(&mut self, event: FirstPartyEvent) -> bool {
        match transition(self.state, &event, &self.context) {
            Transition::Ignored => {
                debug!(flow_id = %self.flow_id, state = %self.state, ?event, "event ignored");
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

    fn enter(&mut self, state: FirstPartyState) {
        debug!(flow_id = %self.flow_id, from = %self.state, to = %state, "first-party state entered");
        self.state = state;
        self.history.push(state);
    }

    async fn settle(&mut self) {
        while let Some(event) = self.services.invoke(self.state, &self.context).await {
            if let FirstPartyEvent::Failed(error) = &event {
                warn!(flow_id = %self.flow_id, state = %self.state, %error, "first-party service failed");
            }
            if !self.apply(event) {
                let error = ErrorDetails::new(
                    "Authorization challenge failed",
                    format!("unexpected service result in {}", self.state),
                );
                self.apply(FirstPartyEvent::Failed(error));
            }
        }
    }
}
