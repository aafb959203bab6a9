use async_trait::async_trait;
use shared::{
    domain::UserId,
    message::{ElementKind, MessageChain, MessageElement, MENTION_ALL_DISPLAY},
    wire::{TextElem, WireElement},
};

use super::{
    DecoderContext, EncoderContext, MessageDecoder, MessageEncoder, MessageProtocol,
    ProcessorCollector,
};
use crate::{
    error::{CodecError, SendMessageError},
    outgoing::{OutgoingContext, OutgoingProcessor},
};

const MENTION_BUFFER_LEN: usize = 13;

pub struct TextProtocol;

impl MessageProtocol for TextProtocol {
    fn name(&self) -> &'static str {
        "text"
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::PlainText, TextEncoder);
        collector.add_encoder(ElementKind::Mention, TextEncoder);
        collector.add_encoder(ElementKind::MentionAll, TextEncoder);
        collector.add_decoder(TextDecoder);
        collector.add_preprocessor(MentionLegalizer);
    }
}

/// Attribute buffer marking `text_len` UTF-16 units as a mention of `uin`,
/// or of everyone when `uin` is `None`.
pub fn mention_attribute(text_len: usize, uin: Option<i64>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MENTION_BUFFER_LEN);
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&(text_len.min(u16::MAX as usize) as u16).to_be_bytes());
    buf.push(u8::from(uin.is_none()));
    buf.extend_from_slice(&(uin.unwrap_or(0) as u32).to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf
}

struct TextEncoder;

impl MessageEncoder for TextEncoder {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        let text = match element {
            MessageElement::PlainText { content } => WireElement::text(content.clone()),
            MessageElement::Mention { target, display } => {
                let display = if display.is_empty() {
                    format!("@{target}")
                } else {
                    display.clone()
                };
                WireElement::Text(TextElem {
                    attr6_buf: mention_attribute(display.encode_utf16().count(), Some(target.0)),
                    text: display,
                })
            }
            MessageElement::MentionAll => WireElement::Text(TextElem {
                text: MENTION_ALL_DISPLAY.to_string(),
                attr6_buf: mention_attribute(MENTION_ALL_DISPLAY.encode_utf16().count(), None),
            }),
            _ => return Ok(()),
        };
        ctx.mark_as_consumed();
        ctx.collect(text);
        Ok(())
    }
}

struct TextDecoder;

impl MessageDecoder for TextDecoder {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        let WireElement::Text(text) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        if text.attr6_buf.is_empty() {
            ctx.collect(MessageElement::text(text.text.clone()));
            return Ok(());
        }
        let buf = &text.attr6_buf;
        if buf.len() < MENTION_BUFFER_LEN {
            return Err(CodecError::Malformed {
                element: "text mention attribute",
                reason: format!("expected {MENTION_BUFFER_LEN} bytes, got {}", buf.len()),
            });
        }
        let uin = u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]);
        if buf[6] == 1 || uin == 0 {
            ctx.collect(MessageElement::MentionAll);
        } else {
            ctx.collect(MessageElement::Mention {
                target: UserId(i64::from(uin)),
                display: text.text.clone(),
            });
        }
        Ok(())
    }
}

/// Mentions only exist in groups; elsewhere they are sent as their text.
struct MentionLegalizer;

#[async_trait]
impl OutgoingProcessor for MentionLegalizer {
    async fn process(&self, ctx: &mut OutgoingContext) -> Result<(), SendMessageError> {
        if ctx.target().is_group() {
            return Ok(());
        }
        let has_mentions = ctx
            .current()
            .iter()
            .any(|e| matches!(e, MessageElement::Mention { .. } | MessageElement::MentionAll));
        if !has_mentions {
            return Ok(());
        }
        let legalized: MessageChain = ctx
            .current()
            .iter()
            .map(|element| match element {
                MessageElement::Mention { .. } | MessageElement::MentionAll => {
                    MessageElement::text(element.content_string())
                }
                other => other.clone(),
            })
            .collect();
        ctx.replace_current(legalized);
        Ok(())
    }
}
