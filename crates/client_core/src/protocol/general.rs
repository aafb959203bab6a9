use async_trait::async_trait;

use super::{MessageProtocol, ProcessorCollector, PRIORITY_UNSUPPORTED};
use crate::{
    error::SendMessageError,
    outgoing::{OutgoingContext, OutgoingProcessor},
    send::SendMessageHandler,
};

/// Catch-all sender driving the regular message send steps.
pub struct GeneralMessageSenderProtocol;

impl MessageProtocol for GeneralMessageSenderProtocol {
    fn name(&self) -> &'static str {
        "general_message_sender"
    }

    fn priority(&self) -> u32 {
        PRIORITY_UNSUPPORTED
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_sender(GeneralMessageSender);
    }
}

struct GeneralMessageSender;

#[async_trait]
impl OutgoingProcessor for GeneralMessageSender {
    async fn process(&self, ctx: &mut OutgoingContext) -> Result<(), SendMessageError> {
        let components = ctx.components().clone();
        let target = ctx.target().clone();
        let chain = ctx.current().clone();

        let receipt = SendMessageHandler::new(&components, &target)
            .send(&chain)
            .await?;
        ctx.collect_receipt(receipt);
        ctx.mark_as_consumed();
        Ok(())
    }
}
