//! UseCase 層
//!
//! Membership Store、Hub、コーディネータ、ルーターを提供します。

mod coordinator;
mod hub;
mod membership;
mod router;

pub use coordinator::{HubEvent, HubHandle, spawn};
pub use hub::Hub;
pub use membership::{Membership, MembershipSnapshot};
pub use router::PROVISIONAL_MESSAGE_ID;
