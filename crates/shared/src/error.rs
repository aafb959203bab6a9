use thiserror::Error;

use crate::domain::{InternalId, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("sequence ids of {kind:?} message {internal_ids:?} are not available yet")]
    SequenceIdUnavailable {
        kind: SourceKind,
        internal_ids: Vec<InternalId>,
    },
}
