use async_trait::async_trait;
use shared::{
    message::{ElementKind, MessageElement},
    wire::WireElement,
};
use tracing::info;

use super::{
    DecoderContext, EncoderContext, MessageDecoder, MessageEncoder, MessageProtocol,
    ProcessorCollector, PRIORITY_IGNORE,
};
use crate::{
    error::{CodecError, SendMessageError},
    outgoing::{OutgoingContext, OutgoingProcessor},
};

/// Elements that carry no wire content of their own.
pub struct IgnoredMessagesProtocol;

impl MessageProtocol for IgnoredMessagesProtocol {
    fn name(&self) -> &'static str {
        "ignored"
    }

    fn priority(&self) -> u32 {
        PRIORITY_IGNORE
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::MessageSourceMarker, Swallow);
        collector.add_encoder(ElementKind::InternalFlag, Swallow);
        // Live bundles were replaced by the forward uploader already.
        collector.add_encoder(ElementKind::ForwardBundle, Swallow);
        collector.add_decoder(Swallow);
        collector.add_postprocessor(UnresolvedReceiptLogger);
    }
}

struct Swallow;

impl MessageEncoder for Swallow {
    fn encode(&self, _element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        ctx.mark_as_consumed();
        Ok(())
    }
}

impl MessageDecoder for Swallow {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        if matches!(element, WireElement::GeneralFlags(_) | WireElement::ElemFlags2) {
            ctx.mark_as_consumed();
        }
        Ok(())
    }
}

struct UnresolvedReceiptLogger;

#[async_trait]
impl OutgoingProcessor for UnresolvedReceiptLogger {
    async fn process(&self, ctx: &mut OutgoingContext) -> Result<(), SendMessageError> {
        for receipt in ctx.receipts().iter().filter(|receipt| !receipt.is_resolved()) {
            info!(
                contact = %receipt.target,
                internal_ids = ?receipt.internal_ids(),
                "send: delivered with best-effort sequence ids"
            );
        }
        Ok(())
    }
}
