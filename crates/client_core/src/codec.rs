use std::{
    cmp::Reverse,
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use shared::{
    domain::{BotId, Contact, GroupId, SourceKind},
    message::{MessageChain, MessageElement},
    wire::WireElement,
};
use tracing::info;

use crate::{
    error::{CodecError, RegistryError},
    outgoing::OutgoingPipeline,
    pipeline::Pipeline,
    protocol::{builtin_protocols, MessageProtocol, ProcessorCollector},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeAttributes {
    pub contact: Contact,
}

impl EncodeAttributes {
    pub fn for_contact(contact: Contact) -> Self {
        Self { contact }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeAttributes {
    pub bot: BotId,
    pub kind: SourceKind,
    pub from_id: i64,
    pub target_id: i64,
    pub group_id: Option<GroupId>,
}

/// The process-wide encoder, decoder and outgoing pipelines.
pub struct MessageCodec {
    protocols: Vec<&'static str>,
    encoder: Pipeline<MessageElement, WireElement, EncodeAttributes>,
    decoder: Pipeline<WireElement, MessageElement, DecodeAttributes>,
    preprocess: OutgoingPipeline,
    send: OutgoingPipeline,
}

static GLOBAL_CODEC: OnceLock<Arc<MessageCodec>> = OnceLock::new();

/// Sorts protocols by descending priority, keeping declaration order on ties.
pub fn load_protocols(
    mut protocols: Vec<Box<dyn MessageProtocol>>,
) -> Vec<Box<dyn MessageProtocol>> {
    protocols.sort_by_key(|protocol| Reverse(protocol.priority()));
    protocols
}

impl MessageCodec {
    pub fn try_new(protocols: Vec<Box<dyn MessageProtocol>>) -> Result<Self, RegistryError> {
        if protocols.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut seen = HashSet::new();
        for protocol in &protocols {
            if !seen.insert(protocol.name()) {
                return Err(RegistryError::DuplicateProtocol(protocol.name()));
            }
        }

        let protocols = load_protocols(protocols);
        let mut collector = ProcessorCollector::new();
        for protocol in &protocols {
            collector.collect_from(protocol.as_ref());
        }
        let (preprocessors, senders): (Vec<_>, Vec<_>) = collector
            .outgoing
            .into_iter()
            .partition(|registered| registered.stage.is_preprocess());

        Ok(Self {
            protocols: protocols.iter().map(|protocol| protocol.name()).collect(),
            encoder: Pipeline::new(collector.encoders),
            decoder: Pipeline::new(collector.decoders),
            preprocess: OutgoingPipeline::new(preprocessors),
            send: OutgoingPipeline::new(senders),
        })
    }

    pub fn builtin() -> Result<Self, RegistryError> {
        Self::try_new(builtin_protocols())
    }

    /// Built on first use. A registry that fails to assemble aborts the process.
    pub fn global() -> Arc<MessageCodec> {
        GLOBAL_CODEC
            .get_or_init(|| match Self::builtin() {
                Ok(codec) => {
                    info!(protocols = ?codec.protocols, "codec: message protocols loaded");
                    Arc::new(codec)
                }
                Err(err) => panic!("message protocol registry failed to load: {err}"),
            })
            .clone()
    }

    /// Protocol names in registration order.
    pub fn protocols(&self) -> &[&'static str] {
        &self.protocols
    }

    pub fn encoder(&self) -> &Pipeline<MessageElement, WireElement, EncodeAttributes> {
        &self.encoder
    }

    pub fn decoder(&self) -> &Pipeline<WireElement, MessageElement, DecodeAttributes> {
        &self.decoder
    }

    pub fn preprocess_pipeline(&self) -> &OutgoingPipeline {
        &self.preprocess
    }

    pub fn send_pipeline(&self) -> &OutgoingPipeline {
        &self.send
    }

    pub fn encode(
        &self,
        chain: &MessageChain,
        attributes: &EncodeAttributes,
    ) -> Result<Vec<WireElement>, CodecError> {
        self.encoder.process_all(chain.iter(), attributes)
    }

    pub fn decode(
        &self,
        elements: &[WireElement],
        attributes: &DecodeAttributes,
    ) -> Result<MessageChain, CodecError> {
        Ok(self
            .decoder
            .process_all(elements.iter(), attributes)?
            .into_iter()
            .collect())
    }
}
