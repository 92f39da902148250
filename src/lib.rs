//! This library drives the holder side of [OID4VCI] credential issuance.
//!
//! [OID4VCI]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
//!
//! # Usage
//!
//! A wallet builds a [`Holder`] once, from its protocol client, key
//! management, stores and credential verifier:
//!
//! ```ignore
//! use openid4vci_holder::holder::Holder;
//! use openid4vci_holder::machine::{IssuanceEvent, IssuanceState};
//!
//! let holder = Holder::builder()
//!     .with_config(config)
//!     .with_client_factory(client_factory)
//!     .with_identifier_provider(identifier_provider)
//!     .with_contact_store(contact_store)
//!     .with_credential_store(credential_store)
//!     .with_branding_store(branding_store)
//!     .with_verifier(verifier)
//!     .build()?;
//!
//! // Scanned from a QR code or received as a deep link.
//! let mut flow = holder.issuance_from_uri(offer_uri, None, None)?;
//!
//! // Runs until the flow needs the user.
//! match flow.start().await {
//!     IssuanceState::VerifyPin(_) => {
//!         flow.send(IssuanceEvent::SetVerificationCode(pin)).await;
//!     }
//!     IssuanceState::ReviewCredentials => {
//!         flow.send(IssuanceEvent::Next).await;
//!     }
//!     state => handle_other(state, &flow),
//! }
//! ```
//!
//! The collaborators are traits in the [`provider`] module, so the holder
//! works with any protocol client, key management system or storage.
//! In-memory stores for tests live next to the store traits.
//!
//! [`Holder`]: crate::holder::Holder
//!
//! # Flow Overview
//!
//! 1. *Initiation*: the offer is resolved, the issuer metadata retrieved and
//!    the offered credential types are branded for display.
//! 2. *Contact*: the issuer is looked up among the wallet's contacts, keyed by
//!    its host name. Unknown issuers are added by the user.
//! 3. *Authorization*: depending on the offer the wallet selects credential
//!    types, runs a first-party ([`first_party`]) or browser based
//!    authorization, or asks for a transaction code.
//! 4. *Issuance*: credentials are requested, decoded ([`credential`]) and
//!    verified.
//! 5. *Acceptance*: after the user reviewed them the credentials, their
//!    branding and the issuer identity are stored.
//!
//! Every step is a state of the [`machine`]. The transition table is a pure
//! function, tested without any I/O.

pub mod branding;
pub mod config;
pub mod contact;
pub mod core;
pub mod credential;
pub mod error;
pub mod events;
pub mod first_party;
pub mod holder;
pub mod issuance_opts;
pub mod machine;
pub mod provider;
pub mod siop;
pub mod utils;

pub use error::ErrorDetails;
pub use holder::{Holder, HolderBuilder};
