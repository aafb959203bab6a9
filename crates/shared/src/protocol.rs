use serde::{Deserialize, Serialize};

use crate::{
    domain::{BotId, Contact, GroupId, InternalId, SequenceId, SourceKind},
    message::{FileReference, MusicShare},
    wire::WireElement,
};

/// Position of one wire message inside a fragmented send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentInfo {
    pub pkg_num: u32,
    pub pkg_index: u32,
    pub div_seq: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutgoingPacket {
    Message {
        target: Contact,
        internal_id: InternalId,
        elements: Vec<WireElement>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fragment: Option<FragmentInfo>,
    },
    MusicShare {
        target: Contact,
        internal_id: InternalId,
        share: MusicShare,
    },
    FileFeed {
        target: Contact,
        internal_id: InternalId,
        file: FileReference,
    },
}

impl OutgoingPacket {
    pub fn target(&self) -> &Contact {
        match self {
            OutgoingPacket::Message { target, .. }
            | OutgoingPacket::MusicShare { target, .. }
            | OutgoingPacket::FileFeed { target, .. } => target,
        }
    }

    pub fn internal_id(&self) -> InternalId {
        match self {
            OutgoingPacket::Message { internal_id, .. }
            | OutgoingPacket::MusicShare { internal_id, .. }
            | OutgoingPacket::FileFeed { internal_id, .. } => *internal_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum SendResponse {
    Success,
    TooLarge,
    PolicyRejected(i32),
    ServiceUnavailable,
}

/// Server notice that a message sent by `issuer` got its sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEvent {
    pub issuer: BotId,
    pub internal_id: InternalId,
    pub sequence_id: SequenceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub kind: SourceKind,
    pub from_id: i64,
    pub target_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub time: i64,
    pub internal_ids: Vec<InternalId>,
    pub sequence_ids: Vec<SequenceId>,
    pub elements: Vec<WireElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    SendConfirmed(ConfirmationEvent),
    MessageReceived(IncomingMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_events_use_tagged_json() {
        let event = ServerEvent::SendConfirmed(ConfirmationEvent {
            issuer: BotId(1),
            internal_id: InternalId(10),
            sequence_id: SequenceId(500),
        });
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "send_confirmed");
        assert_eq!(json["payload"]["internal_id"], 10);

        let back: ServerEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, event);
    }

    #[test]
    fn packet_exposes_target_and_internal_id() {
        let packet = OutgoingPacket::Message {
            target: Contact::group(9),
            internal_id: InternalId(3),
            elements: vec![WireElement::text("x")],
            fragment: None,
        };
        assert_eq!(packet.internal_id(), InternalId(3));
        assert!(packet.target().is_group());
    }
}
