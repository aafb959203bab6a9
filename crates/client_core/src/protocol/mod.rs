//! Message features and the processors they contribute to the codec.

use shared::{
    message::{ElementKind, MessageElement},
    wire::WireElement,
};

use crate::{
    codec::{DecodeAttributes, EncodeAttributes},
    error::CodecError,
    outgoing::{OutgoingProcessor, OutgoingStage, RegisteredOutgoing},
    pipeline::{PipelineContext, Processor, Registered},
};

mod face;
mod file;
mod forward;
mod general;
mod ignored;
mod image;
mod music_share;
mod quote;
mod rich;
mod text;
mod vip_face;

pub use face::FaceProtocol;
pub use file::FileMessageProtocol;
pub use forward::ForwardMessageProtocol;
pub use general::GeneralMessageSenderProtocol;
pub use ignored::IgnoredMessagesProtocol;
pub use image::ImageProtocol;
pub use music_share::MusicShareProtocol;
pub use quote::QuoteReplyProtocol;
pub use rich::{forward_template, long_message_template, RichMessageProtocol};
pub use text::{mention_attribute, TextProtocol};
pub use vip_face::VipFaceProtocol;

pub const PRIORITY_METADATA: u32 = 30_000;
pub const PRIORITY_CONTENT: u32 = 20_000;
pub const PRIORITY_IGNORE: u32 = 10_000;
pub const PRIORITY_UNSUPPORTED: u32 = 0;

pub type EncoderContext<'p> = PipelineContext<'p, MessageElement, WireElement, EncodeAttributes>;
pub type DecoderContext<'p> = PipelineContext<'p, WireElement, MessageElement, DecodeAttributes>;

pub trait MessageEncoder: Send + Sync {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>)
        -> Result<(), CodecError>;
}

/// Decoders see every wire element and ignore the shapes they do not handle.
pub trait MessageDecoder: Send + Sync {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError>;
}

/// A feature unit registering processors at one priority tier.
pub trait MessageProtocol: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> u32 {
        PRIORITY_CONTENT
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector);
}

struct KindGatedEncoder {
    kind: ElementKind,
    encoder: Box<dyn MessageEncoder>,
}

impl Processor<MessageElement, WireElement, EncodeAttributes> for KindGatedEncoder {
    fn accepts(&self, input: &MessageElement) -> bool {
        input.kind() == self.kind
    }

    fn process(&self, input: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        self.encoder.encode(input, ctx)
    }
}

struct DecoderProcessor(Box<dyn MessageDecoder>);

impl Processor<WireElement, MessageElement, DecodeAttributes> for DecoderProcessor {
    fn process(&self, input: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        self.0.decode(input, ctx)
    }
}

pub(crate) type EncoderRegistration =
    Registered<dyn Processor<MessageElement, WireElement, EncodeAttributes>>;
pub(crate) type DecoderRegistration =
    Registered<dyn Processor<WireElement, MessageElement, DecodeAttributes>>;

/// Receives the processors of one protocol, stamping them with its priority.
pub struct ProcessorCollector {
    origin: &'static str,
    priority: u32,
    pub(crate) encoders: Vec<EncoderRegistration>,
    pub(crate) decoders: Vec<DecoderRegistration>,
    pub(crate) outgoing: Vec<RegisteredOutgoing>,
}

impl ProcessorCollector {
    pub(crate) fn new() -> Self {
        Self {
            origin: "",
            priority: PRIORITY_UNSUPPORTED,
            encoders: Vec::new(),
            decoders: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    pub(crate) fn collect_from(&mut self, protocol: &dyn MessageProtocol) {
        self.origin = protocol.name();
        self.priority = protocol.priority();
        protocol.collect_processors(self);
    }

    pub fn add_encoder(&mut self, kind: ElementKind, encoder: impl MessageEncoder + 'static) {
        self.encoders.push(Registered {
            priority: self.priority,
            origin: self.origin,
            processor: Box::new(KindGatedEncoder {
                kind,
                encoder: Box::new(encoder),
            }),
        });
    }

    pub fn add_decoder(&mut self, decoder: impl MessageDecoder + 'static) {
        self.decoders.push(Registered {
            priority: self.priority,
            origin: self.origin,
            processor: Box::new(DecoderProcessor(Box::new(decoder))),
        });
    }

    pub fn add_preprocessor(&mut self, processor: impl OutgoingProcessor + 'static) {
        self.add_outgoing(OutgoingStage::Preprocess, processor);
    }

    pub fn add_transformer(&mut self, processor: impl OutgoingProcessor + 'static) {
        self.add_outgoing(OutgoingStage::Transform, processor);
    }

    pub fn add_sender(&mut self, processor: impl OutgoingProcessor + 'static) {
        self.add_outgoing(OutgoingStage::Send, processor);
    }

    pub fn add_postprocessor(&mut self, processor: impl OutgoingProcessor + 'static) {
        self.add_outgoing(OutgoingStage::Postprocess, processor);
    }

    fn add_outgoing(&mut self, stage: OutgoingStage, processor: impl OutgoingProcessor + 'static) {
        self.outgoing.push(RegisteredOutgoing {
            stage,
            priority: self.priority,
            origin: self.origin,
            processor: Box::new(processor),
        });
    }
}

/// Every protocol shipped with the client.
pub fn builtin_protocols() -> Vec<Box<dyn MessageProtocol>> {
    vec![
        Box::new(TextProtocol),
        Box::new(FaceProtocol),
        Box::new(ImageProtocol),
        Box::new(VipFaceProtocol),
        Box::new(MusicShareProtocol),
        Box::new(FileMessageProtocol),
        Box::new(RichMessageProtocol),
        Box::new(QuoteReplyProtocol),
        Box::new(ForwardMessageProtocol),
        Box::new(GeneralMessageSenderProtocol),
        Box::new(IgnoredMessagesProtocol),
    ]
}

#[cfg(test)]
#[path = "../tests/protocol_tests.rs"]
mod tests;
