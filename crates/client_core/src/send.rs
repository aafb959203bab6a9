//! The per-send escalation protocol: FIRST, then LONG_MESSAGE, then FRAGMENTED.

use std::{future::Future, mem, sync::Arc, time::Duration};

use chrono::Utc;
use highway::{upload_long_message, HighwayUploader};
use rand::Rng;
use serde::Serialize;
use shared::{
    domain::{BotProfile, Contact, ContactKind, InternalId, SequenceId},
    message::{ElementKind, Flag, MessageChain, MessageElement, MessageSource, RichMessage, SequenceIds},
    protocol::{FragmentInfo, OutgoingPacket, SendResponse},
    wire::WireElement,
};
use tracing::{debug, info, warn};

use crate::{
    codec::{EncodeAttributes, MessageCodec},
    config::ClientSettings,
    error::{PolicyReason, SendMessageError, TimedOperation},
    protocol::long_message_template,
    receipt::{DeliveryReceipt, ReceiptCorrelator},
    session::{NetworkSession, SyncBarrier},
};

/// Everything a send needs from outside the codec.
pub struct SendComponents {
    pub bot: BotProfile,
    pub settings: ClientSettings,
    pub codec: Arc<MessageCodec>,
    pub session: Arc<dyn NetworkSession>,
    pub highway: Arc<dyn HighwayUploader>,
    pub correlator: Arc<ReceiptCorrelator>,
    pub barrier: Arc<dyn SyncBarrier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStep {
    First,
    LongMessage,
    Fragmented,
}

impl SendStep {
    /// The step to retry with after a "too large" reply, if any is left.
    pub fn next(self) -> Option<SendStep> {
        match self {
            SendStep::First => Some(SendStep::LongMessage),
            SendStep::LongMessage => Some(SendStep::Fragmented),
            SendStep::Fragmented => None,
        }
    }
}

/// Contact-kind specific parts of sending.
pub trait ContactStrategy: Send + Sync {
    fn policy_error(&self, target: &Contact, code: i32, chain: &MessageChain) -> SendMessageError;

    fn supports_file_feed(&self) -> bool;
}

pub struct GroupStrategy;

impl ContactStrategy for GroupStrategy {
    fn policy_error(&self, target: &Contact, code: i32, chain: &MessageChain) -> SendMessageError {
        let reason = match code {
            120 => Some(PolicyReason::BotMuted),
            121 if chain.contains_kind(ElementKind::MentionAll) => Some(PolicyReason::AtAllLimited),
            299 => Some(PolicyReason::GroupChatLimited),
            _ => None,
        };
        match reason {
            Some(reason) => SendMessageError::PolicyRejected {
                target: target.clone(),
                reason,
            },
            None => SendMessageError::Rejected {
                target: target.clone(),
                code,
            },
        }
    }

    fn supports_file_feed(&self) -> bool {
        true
    }
}

/// Friends, group temp sessions and strangers.
pub struct UserStrategy;

impl ContactStrategy for UserStrategy {
    fn policy_error(&self, target: &Contact, code: i32, _chain: &MessageChain) -> SendMessageError {
        SendMessageError::Rejected {
            target: target.clone(),
            code,
        }
    }

    fn supports_file_feed(&self) -> bool {
        false
    }
}

pub fn strategy_for(kind: ContactKind) -> &'static dyn ContactStrategy {
    match kind {
        ContactKind::Group => &GroupStrategy,
        ContactKind::Friend | ContactKind::GroupTemp | ContactKind::Stranger => &UserStrategy,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseOutcome {
    Accepted,
    TooLarge,
}

enum Attempt {
    Delivered(DeliveryReceipt),
    TooLarge,
}

pub struct SendMessageHandler<'a> {
    components: &'a SendComponents,
    target: &'a Contact,
    strategy: &'static dyn ContactStrategy,
}

impl<'a> SendMessageHandler<'a> {
    pub fn new(components: &'a SendComponents, target: &'a Contact) -> Self {
        Self {
            components,
            target,
            strategy: strategy_for(target.kind),
        }
    }

    pub fn strategy(&self) -> &'static dyn ContactStrategy {
        self.strategy
    }

    /// Sends `chain`, escalating through the steps on "too large" replies.
    pub async fn send(&self, chain: &MessageChain) -> Result<DeliveryReceipt, SendMessageError> {
        self.components.barrier.synchronize(self.target).await;
        let mut step = SendStep::First;
        loop {
            match self.attempt(chain, step).await? {
                Attempt::Delivered(receipt) => return Ok(receipt),
                Attempt::TooLarge if chain.has_flag(Flag::ForceAsLongMessage) => {
                    warn!(contact = %self.target, "send: forced long message rejected as too large");
                    return Err(self.too_large());
                }
                Attempt::TooLarge => match step.next() {
                    Some(next) => {
                        info!(contact = %self.target, from = ?step, to = ?next, "send: escalating after too large reply");
                        step = next;
                    }
                    None => {
                        warn!(contact = %self.target, "send: fragmented delivery rejected as too large");
                        return Err(self.too_large());
                    }
                },
            }
        }
    }

    /// Sends a dedicated single packet, such as a music share or a file feed.
    pub async fn send_special(
        &self,
        chain: &MessageChain,
        packet: impl FnOnce(InternalId) -> OutgoingPacket + Send,
    ) -> Result<DeliveryReceipt, SendMessageError> {
        self.components.barrier.synchronize(self.target).await;
        let pending = self.components.correlator.reserve(self.components.bot.id, 1);
        let internal_ids = pending.internal_ids().to_vec();
        let packet = internal_ids
            .first()
            .copied()
            .map(packet)
            .ok_or_else(|| SendMessageError::internal("no internal id reserved", chain))?;

        let response = self.transmit(packet).await?;
        if self.check_response(response, chain)? == ResponseOutcome::TooLarge {
            return Err(self.too_large());
        }

        let sequence_ids = pending
            .wait(self.components.settings.special_receipt_timeout())
            .await;
        Ok(self.receipt(chain.clone(), internal_ids, sequence_ids))
    }

    async fn transmit(&self, packet: OutgoingPacket) -> Result<SendResponse, SendMessageError> {
        let session = &self.components.session;
        bounded(
            self.target,
            TimedOperation::ServerResponse,
            self.components.settings.response_timeout(),
            async { session.send_and_await(packet).await.map_err(SendMessageError::Network) },
        )
        .await
    }

    pub(crate) fn check_response(
        &self,
        response: SendResponse,
        chain: &MessageChain,
    ) -> Result<ResponseOutcome, SendMessageError> {
        match response {
            SendResponse::Success => Ok(ResponseOutcome::Accepted),
            SendResponse::TooLarge => Ok(ResponseOutcome::TooLarge),
            SendResponse::PolicyRejected(code) => {
                warn!(contact = %self.target, code, "send: rejected by server policy");
                Err(self.strategy.policy_error(self.target, code, chain))
            }
            SendResponse::ServiceUnavailable => Err(SendMessageError::ServiceUnavailable {
                target: self.target.clone(),
            }),
        }
    }

    async fn attempt(&self, chain: &MessageChain, step: SendStep) -> Result<Attempt, SendMessageError> {
        let prepared = self.prepare(chain, step).await?;
        if let Some(quote) = prepared.quote() {
            quote.ensure_available()?;
        }

        let attributes = EncodeAttributes::for_contact(self.target.clone());
        let elements = self.components.codec.encode(&prepared, &attributes)?;
        let parts = if step == SendStep::Fragmented {
            fragment_elements(elements, self.components.settings.fragment_bytes)
        } else {
            vec![elements]
        };

        let pending = self
            .components
            .correlator
            .reserve(self.components.bot.id, parts.len());
        let internal_ids = pending.internal_ids().to_vec();
        let packets = self.packets(parts, &internal_ids, step);
        debug!(contact = %self.target, step = ?step, packets = packets.len(), "send: transmitting");

        for packet in packets {
            let response = self.transmit(packet).await?;
            if self.check_response(response, &prepared)? == ResponseOutcome::TooLarge {
                return Ok(Attempt::TooLarge);
            }
        }

        let timeout = self.components.settings.receipt_timeout(internal_ids.len());
        let sequence_ids = pending.wait(timeout).await;
        Ok(Attempt::Delivered(self.receipt(prepared, internal_ids, sequence_ids)))
    }

    async fn prepare(&self, chain: &MessageChain, step: SendStep) -> Result<MessageChain, SendMessageError> {
        match step {
            SendStep::First => {
                if chain.has_flag(Flag::ForceAsLongMessage) {
                    return self.as_long_message(chain).await;
                }
                if !chain.has_flag(Flag::IgnoreLengthCheck) {
                    self.validate(chain)?;
                }
                Ok(chain.clone())
            }
            SendStep::LongMessage if chain.has_flag(Flag::DontAsLongMessage) => Ok(chain.clone()),
            SendStep::LongMessage => self.as_long_message(chain).await,
            SendStep::Fragmented => Ok(chain.clone()),
        }
    }

    fn validate(&self, chain: &MessageChain) -> Result<(), SendMessageError> {
        let settings = &self.components.settings;
        if !chain.iter().any(MessageElement::is_content) {
            return Err(SendMessageError::Validation {
                target: self.target.clone(),
                reason: "message is empty".to_string(),
            });
        }
        let text_len = chain.text_len();
        let images = chain.image_count();
        if text_len > settings.max_text_chars || images > settings.max_images {
            warn!(contact = %self.target, text_len, images, "send: message exceeds local limits");
            return Err(self.too_large());
        }
        Ok(())
    }

    /// Uploads the content and replaces it with a long-message pointer.
    /// Metadata such as quotes and flags stays in the chain.
    async fn as_long_message(&self, chain: &MessageChain) -> Result<MessageChain, SendMessageError> {
        let components = self.components;
        let res_id = bounded(
            self.target,
            TimedOperation::HighwayUpload,
            components.settings.upload_timeout(),
            async {
                upload_long_message(components.highway.as_ref(), &components.bot, self.target, chain)
                    .await
                    .map_err(SendMessageError::Upload)
            },
        )
        .await?;
        let brief = chain.take_content(components.settings.long_message_brief_chars);
        let pointer = RichMessage::LongMessage {
            content: long_message_template(&brief, &res_id),
            res_id,
        };

        Ok(chain
            .iter()
            .filter(|element| !element.is_content())
            .cloned()
            .chain(std::iter::once(MessageElement::RichMessage(pointer)))
            .collect())
    }

    fn packets(
        &self,
        parts: Vec<Vec<WireElement>>,
        internal_ids: &[InternalId],
        step: SendStep,
    ) -> Vec<OutgoingPacket> {
        let pkg_num = parts.len() as u32;
        let div_seq = rand::thread_rng().gen_range(1..=i32::from(u16::MAX));
        parts
            .into_iter()
            .zip(internal_ids)
            .enumerate()
            .map(|(index, (elements, internal_id))| OutgoingPacket::Message {
                target: self.target.clone(),
                internal_id: *internal_id,
                elements,
                fragment: (step == SendStep::Fragmented).then_some(FragmentInfo {
                    pkg_num,
                    pkg_index: index as u32,
                    div_seq,
                }),
            })
            .collect()
    }

    fn receipt(
        &self,
        chain: MessageChain,
        internal_ids: Vec<InternalId>,
        sequence_ids: Vec<Option<SequenceId>>,
    ) -> DeliveryReceipt {
        let source = MessageSource::new(
            self.target.source_kind(),
            self.components.bot.id.0,
            self.target.id,
            Utc::now().timestamp(),
            internal_ids,
            SequenceIds::from_partial(sequence_ids),
            chain,
        );
        DeliveryReceipt {
            target: self.target.clone(),
            source,
        }
    }

    fn too_large(&self) -> SendMessageError {
        SendMessageError::MessageTooLarge {
            target: self.target.clone(),
        }
    }
}

/// Runs `work` but gives up once `limit` has passed.
pub(crate) async fn bounded<T>(
    target: &Contact,
    operation: TimedOperation,
    limit: Duration,
    work: impl Future<Output = Result<T, SendMessageError>>,
) -> Result<T, SendMessageError> {
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => {
            let elapsed_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            warn!(contact = %target, %operation, elapsed_ms, "send: gave up waiting");
            Err(SendMessageError::Timeout {
                target: target.clone(),
                operation,
                elapsed_ms,
            })
        }
    }
}

/// Text bytes reserved for element framing when splitting text.
const TEXT_OVERHEAD: usize = 4;

/// Splits encoded elements into groups whose estimated size fits `budget`.
///
/// Plain text larger than the budget is cut at character boundaries. Any other
/// element that does not fit alone still gets a group of its own.
pub fn fragment_elements(elements: Vec<WireElement>, budget: usize) -> Vec<Vec<WireElement>> {
    let mut parts = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0;
    let mut push = |piece: WireElement, parts: &mut Vec<Vec<WireElement>>| {
        let size = piece.estimated_size();
        if !current.is_empty() && current_size + size > budget {
            parts.push(mem::take(&mut current));
            current_size = 0;
        }
        current.push(piece);
        current_size += size;
    };

    for element in elements {
        match element {
            WireElement::Text(text) if text.attr6_buf.is_empty() && text.text.len() + TEXT_OVERHEAD > budget => {
                for chunk in split_text(&text.text, budget.saturating_sub(TEXT_OVERHEAD)) {
                    push(WireElement::text(chunk), &mut parts);
                }
            }
            other => push(other, &mut parts),
        }
    }
    drop(push);
    if !current.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

fn split_text(text: &str, max_bytes: usize) -> Vec<String> {
    let max_bytes = max_bytes.max(4);
    let mut chunks = Vec::new();
    let mut chunk = String::new();
    for c in text.chars() {
        if chunk.len() + c.len_utf8() > max_bytes {
            chunks.push(mem::take(&mut chunk));
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

#[cfg(test)]
#[path = "tests/send_tests.rs"]
mod tests;
