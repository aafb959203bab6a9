use std::fmt;

use serde::Serialize;
use shared::{
    domain::{Contact, InternalId},
    error::SourceError,
    message::MessageChain,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cascade depth {depth} exceeded while processing {element}")]
    CascadeTooDeep { depth: usize, element: String },
    #[error("malformed {element}: {reason}")]
    Malformed {
        element: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no message protocols registered")]
    Empty,
    #[error("message protocol '{0}' registered twice")]
    DuplicateProtocol(&'static str),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("internal id {0} is already awaiting a confirmation")]
    DuplicateInternalId(InternalId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyReason {
    BotMuted,
    AtAllLimited,
    GroupChatLimited,
}

impl PolicyReason {
    pub fn code(self) -> i32 {
        match self {
            PolicyReason::BotMuted => 120,
            PolicyReason::AtAllLimited => 121,
            PolicyReason::GroupChatLimited => 299,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedOperation {
    ServerResponse,
    HighwayUpload,
}

impl fmt::Display for TimedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimedOperation::ServerResponse => f.write_str("server response"),
            TimedOperation::HighwayUpload => f.write_str("highway upload"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SendMessageError {
    #[error("message to {target} rejected before sending: {reason}")]
    Validation { target: Contact, reason: String },
    #[error("message to {target} is too large to be delivered in any form")]
    MessageTooLarge { target: Contact },
    #[error("message to {target} rejected by policy: {reason:?}")]
    PolicyRejected {
        target: Contact,
        reason: PolicyReason,
    },
    #[error("service unavailable while sending to {target}")]
    ServiceUnavailable { target: Contact },
    #[error("message to {target} rejected with code {code}")]
    Rejected { target: Contact, code: i32 },
    #[error(transparent)]
    SequenceIdUnavailable(#[from] SourceError),
    /// Programmer error; `dump` is the chain that triggered it.
    #[error("internal error: {message}\n{dump}")]
    Internal { message: String, dump: String },
    #[error(transparent)]
    Codec(CodecError),
    #[error("highway upload failed: {0:#}")]
    Upload(anyhow::Error),
    #[error("{operation} for {target} timed out after {elapsed_ms}ms")]
    Timeout {
        target: Contact,
        operation: TimedOperation,
        elapsed_ms: u64,
    },
    #[error("network session failed: {0:#}")]
    Network(anyhow::Error),
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

impl SendMessageError {
    pub(crate) fn internal(message: impl Into<String>, chain: &MessageChain) -> Self {
        let dump = serde_json::to_string_pretty(chain)
            .unwrap_or_else(|err| format!("<chain dump unavailable: {err}>"));
        SendMessageError::Internal {
            message: message.into(),
            dump,
        }
    }
}

impl From<CodecError> for SendMessageError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Source(source) => SendMessageError::SequenceIdUnavailable(source),
            other => SendMessageError::Codec(other),
        }
    }
}
