use std::{cmp::Reverse, sync::Arc};

use async_trait::async_trait;
use shared::{domain::Contact, message::MessageChain};

use crate::{error::SendMessageError, receipt::DeliveryReceipt, send::SendComponents};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutgoingStage {
    Preprocess,
    Transform,
    Send,
    Postprocess,
}

impl OutgoingStage {
    pub fn is_preprocess(self) -> bool {
        matches!(self, OutgoingStage::Preprocess)
    }
}

/// One step of sending a whole chain: legalize, transform, transmit or observe.
#[async_trait]
pub trait OutgoingProcessor: Send + Sync {
    async fn process(&self, ctx: &mut OutgoingContext) -> Result<(), SendMessageError>;
}

pub struct RegisteredOutgoing {
    pub stage: OutgoingStage,
    pub priority: u32,
    pub origin: &'static str,
    pub processor: Box<dyn OutgoingProcessor>,
}

pub struct OutgoingPipeline {
    processors: Vec<RegisteredOutgoing>,
}

impl OutgoingPipeline {
    /// Stage order first, then descending priority; ties keep registration order.
    pub fn new(mut processors: Vec<RegisteredOutgoing>) -> Self {
        processors.sort_by_key(|registered| (registered.stage, Reverse(registered.priority)));
        Self { processors }
    }

    pub fn order(&self) -> Vec<(OutgoingStage, &'static str)> {
        self.processors
            .iter()
            .map(|registered| (registered.stage, registered.origin))
            .collect()
    }

    /// Senders after the one that consumed the context are skipped.
    pub async fn run(&self, ctx: &mut OutgoingContext) -> Result<(), SendMessageError> {
        for registered in &self.processors {
            if registered.stage == OutgoingStage::Send && ctx.is_consumed() {
                continue;
            }
            registered.processor.process(ctx).await?;
        }
        Ok(())
    }
}

pub struct OutgoingContext {
    components: Arc<SendComponents>,
    target: Contact,
    original: MessageChain,
    current: MessageChain,
    receipts: Vec<DeliveryReceipt>,
    consumed: bool,
}

impl OutgoingContext {
    pub fn new(components: Arc<SendComponents>, target: Contact, original: MessageChain) -> Self {
        Self {
            components,
            target,
            current: original.clone(),
            original,
            receipts: Vec::new(),
            consumed: false,
        }
    }

    pub fn components(&self) -> &Arc<SendComponents> {
        &self.components
    }

    pub fn target(&self) -> &Contact {
        &self.target
    }

    /// The chain as the caller passed it.
    pub fn original(&self) -> &MessageChain {
        &self.original
    }

    pub fn current(&self) -> &MessageChain {
        &self.current
    }

    pub fn replace_current(&mut self, chain: MessageChain) {
        self.current = chain;
    }

    pub fn collect_receipt(&mut self, receipt: DeliveryReceipt) {
        self.receipts.push(receipt);
    }

    pub fn receipts(&self) -> &[DeliveryReceipt] {
        &self.receipts
    }

    pub fn mark_as_consumed(&mut self) {
        self.consumed = true;
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// A send must end with exactly one receipt; anything else is a bug.
    pub fn into_single_receipt(mut self) -> Result<DeliveryReceipt, SendMessageError> {
        match self.receipts.len() {
            1 => self.receipts.pop().ok_or_else(|| {
                SendMessageError::internal("receipt vanished", &self.current)
            }),
            count => Err(SendMessageError::internal(
                format!(
                    "send pipeline produced {count} receipts for {}, expected exactly one",
                    self.target
                ),
                &self.current,
            )),
        }
    }
}
