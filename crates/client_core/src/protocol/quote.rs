use shared::{
    domain::{InternalId, SequenceId},
    message::{ElementKind, MessageElement, MessageSource, SequenceIds},
    wire::{SourceMsg, WireElement},
};

use super::{
    DecoderContext, EncoderContext, MessageDecoder, MessageEncoder, MessageProtocol,
    ProcessorCollector, PRIORITY_METADATA,
};
use crate::error::CodecError;

pub struct QuoteReplyProtocol;

impl MessageProtocol for QuoteReplyProtocol {
    fn name(&self) -> &'static str {
        "quote_reply"
    }

    fn priority(&self) -> u32 {
        PRIORITY_METADATA
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::QuoteReply, QuoteReplyEncoder);
        collector.add_decoder(QuoteReplyDecoder);
    }
}

struct QuoteReplyEncoder;

impl MessageEncoder for QuoteReplyEncoder {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        let MessageElement::QuoteReply { source } = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        let sequence_ids = source.ensure_available()?;
        let encoded = source.encoded_or_try_init(|source| {
            let mut elems = Vec::new();
            for quoted in source.original.iter() {
                if matches!(quoted, MessageElement::QuoteReply { .. }) {
                    continue;
                }
                elems.extend(ctx.process_detached(quoted)?.outputs);
            }
            Ok::<_, CodecError>(WireElement::SrcMsg(SourceMsg {
                orig_seqs: sequence_ids.iter().map(|id| id.0).collect(),
                sender_uin: source.from_id,
                to_uin: source.target_id,
                time: source.time,
                elems,
                orig_uids: source
                    .internal_ids
                    .iter()
                    .map(|id| i64::from(id.0 as u32))
                    .collect(),
            }))
        })?;
        ctx.collect(encoded.clone());
        Ok(())
    }
}

struct QuoteReplyDecoder;

impl MessageDecoder for QuoteReplyDecoder {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        let WireElement::SrcMsg(src) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        let mut original = Vec::new();
        for elem in &src.elems {
            original.extend(ctx.process_detached(elem)?.outputs);
        }
        let source = MessageSource::new(
            ctx.attributes().kind,
            src.sender_uin,
            src.to_uin,
            src.time,
            src.orig_uids
                .iter()
                .map(|uid| InternalId(*uid as u32 as i32))
                .collect(),
            SequenceIds::Resolved(src.orig_seqs.iter().copied().map(SequenceId).collect()),
            original.into_iter().collect(),
        );
        ctx.collect(MessageElement::QuoteReply { source });
        Ok(())
    }
}
