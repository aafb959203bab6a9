use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use shared::{
    domain::{BotProfile, Contact},
    message::{ForwardNode, MessageChain},
};
use tracing::debug;

/// Out-of-band blob transport for content too large to send inline.
///
/// Returns the resource id the server assigned to the uploaded bundle. Long
/// messages are uploaded with `is_long = true`; forwarded bundles with `false`.
#[async_trait]
pub trait HighwayUploader: Send + Sync {
    async fn upload(&self, target: &Contact, nodes: &[ForwardNode], is_long: bool)
        -> Result<String>;
}

pub struct MissingHighwayUploader;

#[async_trait]
impl HighwayUploader for MissingHighwayUploader {
    async fn upload(
        &self,
        target: &Contact,
        _nodes: &[ForwardNode],
        _is_long: bool,
    ) -> Result<String> {
        Err(anyhow!("highway uploader is unavailable for {target}"))
    }
}

/// Uploads `chain` as a single-node long message sent by the bot itself.
pub async fn upload_long_message(
    uploader: &dyn HighwayUploader,
    bot: &BotProfile,
    target: &Contact,
    chain: &MessageChain,
) -> Result<String> {
    let node = ForwardNode::now(bot.id.0, bot.name_in(target), chain.without_metadata());
    debug!(contact = %target, bot_id = bot.id.0, "highway: uploading long message");
    uploader
        .upload(target, std::slice::from_ref(&node), true)
        .await
        .with_context(|| format!("long message upload to {target} failed"))
}

/// Uploads forwarded nodes as they are.
pub async fn upload_forward(
    uploader: &dyn HighwayUploader,
    target: &Contact,
    nodes: &[ForwardNode],
) -> Result<String> {
    debug!(contact = %target, nodes = nodes.len(), "highway: uploading forward bundle");
    uploader
        .upload(target, nodes, false)
        .await
        .with_context(|| format!("forward upload to {target} failed"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingUploader {
        uploads: Mutex<Vec<(Contact, Vec<ForwardNode>, bool)>>,
    }

    #[async_trait]
    impl HighwayUploader for RecordingUploader {
        async fn upload(
            &self,
            target: &Contact,
            nodes: &[ForwardNode],
            is_long: bool,
        ) -> Result<String> {
            self.uploads
                .lock()
                .expect("uploads lock")
                .push((target.clone(), nodes.to_vec(), is_long));
            Ok("res-1".to_string())
        }
    }

    #[tokio::test]
    async fn long_message_node_is_sent_by_the_bot_under_its_group_card() {
        let uploader = RecordingUploader::default();
        let bot = BotProfile::new(42, "bot");
        let target = Contact::group(7).with_bot_name_card("card");
        let chain = MessageChain::from_text("long body");

        let res_id = upload_long_message(&uploader, &bot, &target, &chain)
            .await
            .expect("upload");

        assert_eq!(res_id, "res-1");
        let uploads = uploader.uploads.lock().expect("uploads lock");
        let (contact, nodes, is_long) = &uploads[0];
        assert_eq!(contact, &target);
        assert!(*is_long);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].sender_id, 42);
        assert_eq!(nodes[0].sender_name, "card");
        assert_eq!(nodes[0].chain, chain);
    }

    #[tokio::test]
    async fn missing_uploader_reports_unavailable() {
        let err = upload_forward(&MissingHighwayUploader, &Contact::friend(1), &[])
            .await
            .expect_err("missing uploader must fail");
        assert!(format!("{err:#}").contains("unavailable"));
    }
}
