use pdes_core::{Day, LocalId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("cannot enqueue agent {agent} at {day}: clock already at {now}")]
    IntoPast { agent: LocalId, day: Day, now: Day },
}

pub type SchedResult<T> = Result<T, SchedError>;
