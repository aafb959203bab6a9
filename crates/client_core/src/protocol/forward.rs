use async_trait::async_trait;
use highway::upload_forward;
use shared::message::{ElementKind, Flag, MessageElement, RichMessage};
use tracing::debug;

use super::{forward_template, MessageProtocol, ProcessorCollector, PRIORITY_METADATA};
use crate::{
    error::{SendMessageError, TimedOperation},
    outgoing::{OutgoingContext, OutgoingProcessor},
    send::bounded,
};

pub struct ForwardMessageProtocol;

impl MessageProtocol for ForwardMessageProtocol {
    fn name(&self) -> &'static str {
        "forward_message"
    }

    fn priority(&self) -> u32 {
        PRIORITY_METADATA
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_transformer(ForwardUploader);
    }
}

/// Uploads forwarded bundles and leaves a pointer in their place.
struct ForwardUploader;

#[async_trait]
impl OutgoingProcessor for ForwardUploader {
    async fn process(&self, ctx: &mut OutgoingContext) -> Result<(), SendMessageError> {
        if !ctx.current().contains_kind(ElementKind::ForwardBundle) {
            return Ok(());
        }
        let components = ctx.components().clone();
        let target = ctx.target().clone();
        let max_nodes = components.settings.max_forward_nodes;
        let check_length = !ctx.current().has_flag(Flag::IgnoreLengthCheck);

        let mut transformed = Vec::with_capacity(ctx.current().len());
        for element in ctx.current().iter() {
            let MessageElement::ForwardBundle(bundle) = element else {
                transformed.push(element.clone());
                continue;
            };
            if check_length && bundle.nodes.len() > max_nodes {
                debug!(nodes = bundle.nodes.len(), max_nodes, "forward: too many nodes");
                return Err(SendMessageError::MessageTooLarge { target });
            }
            let res_id = bounded(
                &target,
                TimedOperation::HighwayUpload,
                components.settings.upload_timeout(),
                async {
                    upload_forward(components.highway.as_ref(), &target, &bundle.nodes)
                        .await
                        .map_err(SendMessageError::Upload)
                },
            )
            .await?;
            transformed.push(MessageElement::RichMessage(RichMessage::Forward {
                content: forward_template(bundle, &res_id),
                res_id,
            }));
        }
        ctx.replace_current(transformed.into_iter().collect());
        Ok(())
    }
}
