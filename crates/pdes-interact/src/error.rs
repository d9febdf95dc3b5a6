use pdes_core::LocalId;
use thiserror::Error;

/// Misuse of a resource's lock/unlock/awaken contract.
///
/// Every variant is a logic defect in agent code.  The scheduler layer maps
/// these into the kernel's fatal error taxonomy, attaching agent names.
#[derive(Debug, Error)]
pub enum InteractError {
    #[error("agent {agent} does not hold `{resource}`")]
    NotHolder { resource: String, agent: LocalId },

    #[error("{target} is not waiting in `{resource}`")]
    NotWaiting { resource: String, target: String },

    #[error("rendezvous key already consumed or never issued in `{resource}`")]
    StaleKey { resource: String },

    #[error("`{resource}` does not issue rendezvous keys")]
    NotARendezvous { resource: String },
}

pub type InteractResult<T> = Result<T, InteractError>;
