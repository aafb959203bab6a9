use async_trait::async_trait;
use shared::{
    message::{ElementKind, MessageElement},
    protocol::OutgoingPacket,
};

use super::{EncoderContext, MessageEncoder, MessageProtocol, ProcessorCollector};
use crate::{
    error::{CodecError, SendMessageError},
    outgoing::{OutgoingContext, OutgoingProcessor},
    send::SendMessageHandler,
};

pub struct MusicShareProtocol;

impl MessageProtocol for MusicShareProtocol {
    fn name(&self) -> &'static str {
        "music_share"
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::MusicShare, MusicShareEncoder);
        collector.add_sender(MusicShareSender);
    }
}

/// Only reached for shares inside quoted sources; live shares use the sender.
struct MusicShareEncoder;

impl MessageEncoder for MusicShareEncoder {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        if !matches!(element, MessageElement::MusicShare(_)) {
            return Ok(());
        }
        ctx.mark_as_consumed();
        ctx.process_also(MessageElement::text(element.content_string()))
    }
}

struct MusicShareSender;

#[async_trait]
impl OutgoingProcessor for MusicShareSender {
    async fn process(&self, ctx: &mut OutgoingContext) -> Result<(), SendMessageError> {
        let Some(MessageElement::MusicShare(share)) = ctx.current().first_of(ElementKind::MusicShare)
        else {
            return Ok(());
        };
        let share = share.clone();
        let components = ctx.components().clone();
        let target = ctx.target().clone();
        let chain = ctx.current().clone();

        let receipt = SendMessageHandler::new(&components, &target)
            .send_special(&chain, |internal_id| OutgoingPacket::MusicShare {
                target: target.clone(),
                internal_id,
                share,
            })
            .await?;
        ctx.collect_receipt(receipt);
        ctx.mark_as_consumed();
        Ok(())
    }
}
