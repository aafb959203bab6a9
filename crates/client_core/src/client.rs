use std::sync::Arc;

use futures::StreamExt;
use highway::{HighwayUploader, MissingHighwayUploader};
use shared::{
    domain::{BotProfile, Contact},
    message::{MessageChain, MessageElement, MessageSource, SequenceIds},
    protocol::{IncomingMessage, ServerEvent},
    wire::WireElement,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};

use crate::{
    codec::{DecodeAttributes, MessageCodec},
    config::ClientSettings,
    error::{CodecError, SendMessageError},
    outgoing::OutgoingContext,
    receipt::{DeliveryReceipt, ReceiptCorrelator},
    send::SendComponents,
    session::{NetworkSession, NoopSyncBarrier, SyncBarrier},
};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    MessageSent(DeliveryReceipt),
    /// An inbound message, led by its source marker.
    MessageDecoded(MessageChain),
    Error(String),
}

pub struct MessageClient {
    components: Arc<SendComponents>,
    events: broadcast::Sender<ClientEvent>,
}

impl MessageClient {
    pub fn new(
        bot: BotProfile,
        settings: ClientSettings,
        session: Arc<dyn NetworkSession>,
    ) -> Arc<Self> {
        Self::new_with_dependencies(
            bot,
            settings,
            MessageCodec::global(),
            session,
            Arc::new(MissingHighwayUploader),
            Arc::new(NoopSyncBarrier),
        )
    }

    pub fn new_with_dependencies(
        bot: BotProfile,
        settings: ClientSettings,
        codec: Arc<MessageCodec>,
        session: Arc<dyn NetworkSession>,
        highway: Arc<dyn HighwayUploader>,
        barrier: Arc<dyn SyncBarrier>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_channel_capacity.max(1));
        Arc::new(Self {
            components: Arc::new(SendComponents {
                bot,
                settings,
                codec,
                session,
                highway,
                correlator: ReceiptCorrelator::new(),
                barrier,
            }),
            events,
        })
    }

    pub fn bot(&self) -> &BotProfile {
        &self.components.bot
    }

    pub fn codec(&self) -> &Arc<MessageCodec> {
        &self.components.codec
    }

    pub fn correlator(&self) -> &Arc<ReceiptCorrelator> {
        &self.components.correlator
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Legalizes, transforms and sends `message` to `target`.
    pub async fn send(
        &self,
        target: &Contact,
        message: MessageChain,
    ) -> Result<DeliveryReceipt, SendMessageError> {
        let codec = self.components.codec.clone();
        let mut ctx = OutgoingContext::new(self.components.clone(), target.clone(), message);
        codec.preprocess_pipeline().run(&mut ctx).await?;
        codec.send_pipeline().run(&mut ctx).await?;
        let receipt = ctx.into_single_receipt()?;

        info!(
            contact = %target,
            internal_ids = ?receipt.internal_ids(),
            resolved = receipt.is_resolved(),
            "send: message delivered"
        );
        let _ = self.events.send(ClientEvent::MessageSent(receipt.clone()));
        Ok(receipt)
    }

    pub fn decode(
        &self,
        elements: &[WireElement],
        attributes: &DecodeAttributes,
    ) -> Result<MessageChain, CodecError> {
        self.components.codec.decode(elements, attributes)
    }

    pub fn handle_server_event(&self, event: ServerEvent) -> Result<(), CodecError> {
        match event {
            ServerEvent::SendConfirmed(confirmation) => {
                self.components.correlator.dispatch(&confirmation);
            }
            ServerEvent::MessageReceived(incoming) => {
                let chain = self.decode_incoming(incoming)?;
                let _ = self.events.send(ClientEvent::MessageDecoded(chain));
            }
        }
        Ok(())
    }

    /// Feeds server events into the client until the sender side closes.
    pub fn spawn_event_pump(
        self: &Arc<Self>,
        receiver: broadcast::Receiver<ServerEvent>,
    ) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut stream = BroadcastStream::new(receiver);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        if let Err(err) = client.handle_server_event(event) {
                            warn!(error = %err, "client: failed to handle server event");
                            let _ = client.events.send(ClientEvent::Error(err.to_string()));
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "client: server event stream lagged");
                    }
                }
            }
            info!("client: server event stream closed");
        })
    }

    fn decode_incoming(&self, incoming: IncomingMessage) -> Result<MessageChain, CodecError> {
        let attributes = DecodeAttributes {
            bot: self.components.bot.id,
            kind: incoming.kind,
            from_id: incoming.from_id,
            target_id: incoming.target_id,
            group_id: incoming.group_id,
        };
        let body = self.decode(&incoming.elements, &attributes)?;
        debug!(
            from_id = incoming.from_id,
            elements = incoming.elements.len(),
            decoded = body.len(),
            "codec: inbound message decoded"
        );
        let source = MessageSource::new(
            incoming.kind,
            incoming.from_id,
            incoming.target_id,
            incoming.time,
            incoming.internal_ids,
            SequenceIds::Resolved(incoming.sequence_ids),
            body.clone(),
        );
        Ok(MessageChain::builder()
            .element(MessageElement::MessageSourceMarker { source })
            .append(body)
            .build())
    }
}
