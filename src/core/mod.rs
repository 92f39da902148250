//! Protocol data types exchanged with credential issuers.

pub mod client_state;
pub mod metadata;
pub mod offer;
pub mod response;
pub mod util;
