use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use highway::MissingHighwayUploader;
use shared::{
    domain::{BotId, SourceKind},
    message::ForwardNode,
    protocol::ConfirmationEvent,
};

use super::*;
use crate::session::MissingNetworkSession;

const BOT: i64 = 10_000;

struct ScriptedSession {
    script: Mutex<VecDeque<SendResponse>>,
    fallback: SendResponse,
    confirm: bool,
    correlator: Arc<ReceiptCorrelator>,
    next_sequence: AtomicI32,
    sent: Mutex<Vec<OutgoingPacket>>,
}

impl ScriptedSession {
    fn sent(&self) -> Vec<OutgoingPacket> {
        self.sent.lock().expect("sent lock").clone()
    }

    fn message_parts(&self) -> Vec<(Vec<WireElement>, Option<FragmentInfo>)> {
        self.sent()
            .into_iter()
            .map(|packet| match packet {
                OutgoingPacket::Message {
                    elements, fragment, ..
                } => (elements, fragment),
                other => panic!("unexpected packet {other:?}"),
            })
            .collect()
    }
}

#[async_trait]
impl NetworkSession for ScriptedSession {
    async fn send_and_await(&self, packet: OutgoingPacket) -> Result<SendResponse> {
        let response = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(self.fallback);
        if response == SendResponse::Success && self.confirm {
            self.correlator.dispatch(&ConfirmationEvent {
                issuer: BotId(BOT),
                internal_id: packet.internal_id(),
                sequence_id: SequenceId(self.next_sequence.fetch_add(1, Ordering::SeqCst)),
            });
        }
        self.sent.lock().expect("sent lock").push(packet);
        Ok(response)
    }
}

#[derive(Default)]
struct RecordingHighway {
    uploads: Mutex<Vec<(Vec<ForwardNode>, bool)>>,
}

impl RecordingHighway {
    fn uploads(&self) -> Vec<(Vec<ForwardNode>, bool)> {
        self.uploads.lock().expect("uploads lock").clone()
    }
}

#[async_trait]
impl HighwayUploader for RecordingHighway {
    async fn upload(&self, _target: &Contact, nodes: &[ForwardNode], is_long: bool) -> Result<String> {
        let mut uploads = self.uploads.lock().expect("uploads lock");
        uploads.push((nodes.to_vec(), is_long));
        Ok(format!("res-{}", uploads.len()))
    }
}

#[derive(Default)]
struct CountingBarrier {
    calls: AtomicUsize,
}

#[async_trait]
impl SyncBarrier for CountingBarrier {
    async fn synchronize(&self, _target: &Contact) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    components: SendComponents,
    session: Arc<ScriptedSession>,
    highway: Arc<RecordingHighway>,
    barrier: Arc<CountingBarrier>,
}

impl Harness {
    fn new(script: Vec<SendResponse>, fallback: SendResponse) -> Self {
        Self::with_settings(script, fallback, true, ClientSettings::default())
    }

    fn with_settings(
        script: Vec<SendResponse>,
        fallback: SendResponse,
        confirm: bool,
        settings: ClientSettings,
    ) -> Self {
        let correlator = ReceiptCorrelator::new();
        let session = Arc::new(ScriptedSession {
            script: Mutex::new(script.into()),
            fallback,
            confirm,
            correlator: correlator.clone(),
            next_sequence: AtomicI32::new(100),
            sent: Mutex::new(Vec::new()),
        });
        let highway = Arc::new(RecordingHighway::default());
        let barrier = Arc::new(CountingBarrier::default());
        let components = SendComponents {
            bot: BotProfile::new(BOT, "bot"),
            settings,
            codec: Arc::new(MessageCodec::builtin().expect("builtin registry")),
            session: session.clone(),
            highway: highway.clone(),
            correlator,
            barrier: barrier.clone(),
        };
        Self {
            components,
            session,
            highway,
            barrier,
        }
    }

    async fn send(&self, target: Contact, chain: &MessageChain) -> Result<DeliveryReceipt, SendMessageError> {
        SendMessageHandler::new(&self.components, &target)
            .send(chain)
            .await
    }
}

fn has_pointer(elements: &[WireElement]) -> bool {
    elements.iter().any(|e| matches!(e, WireElement::RichMsg(_)))
}

#[tokio::test]
async fn accepted_message_resolves_its_sequence_id() {
    let harness = Harness::new(Vec::new(), SendResponse::Success);
    let chain = MessageChain::from_text("hello");

    let receipt = harness
        .send(Contact::group(42), &chain)
        .await
        .expect("send");

    assert_eq!(receipt.sequence_ids(), &SequenceIds::Resolved(vec![SequenceId(100)]));
    assert_eq!(receipt.chain(), &chain);
    assert_eq!(receipt.source.kind, SourceKind::Group);
    assert_eq!(receipt.source.from_id, BOT);
    assert_eq!(receipt.source.target_id, 42);
    assert_eq!(harness.barrier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.components.correlator.subscription_count(), 0);
}

#[tokio::test]
async fn always_too_large_walks_every_step_then_fails() {
    let harness = Harness::new(Vec::new(), SendResponse::TooLarge);

    let err = harness
        .send(Contact::group(42), &MessageChain::from_text("hello"))
        .await
        .expect_err("too large");

    assert!(matches!(err, SendMessageError::MessageTooLarge { .. }));
    let parts = harness.session.message_parts();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], (vec![WireElement::text("hello")], None));
    assert!(has_pointer(&parts[1].0));
    assert_eq!(parts[1].1, None);
    assert_eq!(parts[2].0, vec![WireElement::text("hello")]);
    assert!(matches!(
        parts[2].1,
        Some(FragmentInfo {
            pkg_num: 1,
            pkg_index: 0,
            ..
        })
    ));
    assert_eq!(harness.barrier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.components.correlator.subscription_count(), 0);
}

#[tokio::test]
async fn long_message_carries_the_bot_node_and_keeps_metadata() {
    let harness = Harness::new(vec![SendResponse::TooLarge], SendResponse::Success);
    let source = MessageSource::new(
        SourceKind::Group,
        7,
        42,
        1_700_000_000,
        vec![InternalId(1)],
        SequenceIds::Resolved(vec![SequenceId(5)]),
        MessageChain::from_text("earlier"),
    );
    let chain = MessageChain::builder()
        .element(MessageElement::QuoteReply { source })
        .text("a reply that turned out to be too long")
        .build();
    let target = Contact::group(42).with_bot_name_card("card");

    let receipt = harness.send(target, &chain).await.expect("send");

    assert_eq!(harness.session.sent().len(), 2);
    let uploads = harness.highway.uploads();
    assert_eq!(uploads.len(), 1);
    let (nodes, is_long) = &uploads[0];
    assert!(is_long);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].sender_id, BOT);
    assert_eq!(nodes[0].sender_name, "card");
    assert_eq!(nodes[0].chain, chain.without_metadata());

    let sent = receipt.chain();
    assert!(sent.quote().is_some());
    assert!(!sent.contains_kind(ElementKind::PlainText));
    let Some(MessageElement::RichMessage(RichMessage::LongMessage { res_id, content })) =
        sent.first_of(ElementKind::RichMessage)
    else {
        panic!("long message pointer expected in {sent}");
    };
    assert_eq!(res_id, "res-1");
    assert!(content.contains("brief=\"a reply that turned out to \""));
}

#[tokio::test]
async fn fragmented_delivery_correlates_every_part() {
    let harness = Harness::new(
        vec![SendResponse::TooLarge, SendResponse::TooLarge],
        SendResponse::Success,
    );
    let text = "a".repeat(2_000);

    let receipt = harness
        .send(Contact::friend(9), &MessageChain::from_text(text.clone()))
        .await
        .expect("send");

    let parts = harness.session.message_parts();
    let fragments = &parts[2..];
    assert_eq!(fragments.len(), 3);
    let div_seq = fragments[0].1.expect("fragment info").div_seq;
    for (index, (_, fragment)) in fragments.iter().enumerate() {
        let fragment = fragment.expect("fragment info");
        assert_eq!(fragment.pkg_num, 3);
        assert_eq!(fragment.pkg_index, index as u32);
        assert_eq!(fragment.div_seq, div_seq);
    }
    let rejoined: String = fragments
        .iter()
        .flat_map(|(elements, _)| elements.iter())
        .map(|element| match element {
            WireElement::Text(text) => text.text.clone(),
            other => panic!("unexpected element {other:?}"),
        })
        .collect();
    assert_eq!(rejoined, text);

    assert_eq!(receipt.internal_ids().len(), 3);
    assert!(receipt.is_resolved());
    assert_eq!(receipt.chain(), &MessageChain::from_text(text));
}

#[tokio::test]
async fn dont_as_long_message_resends_without_uploading() {
    let harness = Harness::new(
        vec![SendResponse::TooLarge, SendResponse::TooLarge],
        SendResponse::Success,
    );
    let chain = MessageChain::builder()
        .flag(Flag::DontAsLongMessage)
        .text("hello")
        .build();

    harness.send(Contact::group(1), &chain).await.expect("send");

    let parts = harness.session.message_parts();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[1], (vec![WireElement::text("hello")], None));
    assert!(parts[2].1.is_some());
    assert!(harness.highway.uploads().is_empty());
}

#[tokio::test]
async fn force_as_long_message_uploads_up_front() {
    let harness = Harness::new(Vec::new(), SendResponse::Success);
    let chain = MessageChain::builder()
        .flag(Flag::ForceAsLongMessage)
        .text("short")
        .build();

    let receipt = harness.send(Contact::group(1), &chain).await.expect("send");

    let parts = harness.session.message_parts();
    assert_eq!(parts.len(), 1);
    assert!(has_pointer(&parts[0].0));
    assert_eq!(harness.highway.uploads().len(), 1);
    assert!(receipt.chain().has_flag(Flag::ForceAsLongMessage));
}

#[tokio::test]
async fn forced_long_message_rejected_as_too_large_is_not_retried() {
    let harness = Harness::new(Vec::new(), SendResponse::TooLarge);
    let chain = MessageChain::builder()
        .flag(Flag::ForceAsLongMessage)
        .text("short")
        .build();

    let err = harness
        .send(Contact::group(1), &chain)
        .await
        .expect_err("too large");

    assert!(matches!(err, SendMessageError::MessageTooLarge { .. }));
    assert_eq!(harness.session.sent().len(), 1);
    assert_eq!(harness.highway.uploads().len(), 1);
}

#[tokio::test]
async fn muted_bot_fails_after_a_single_transmission() {
    let harness = Harness::new(Vec::new(), SendResponse::PolicyRejected(120));

    let err = harness
        .send(Contact::group(1), &MessageChain::from_text("hi"))
        .await
        .expect_err("muted");

    assert!(matches!(
        err,
        SendMessageError::PolicyRejected {
            reason: PolicyReason::BotMuted,
            ..
        }
    ));
    assert_eq!(harness.session.sent().len(), 1);
    assert_eq!(harness.components.correlator.subscription_count(), 0);
}

#[tokio::test]
async fn at_all_limit_needs_a_mention_all_in_the_chain() {
    let harness = Harness::new(Vec::new(), SendResponse::PolicyRejected(121));

    let plain = harness
        .send(Contact::group(1), &MessageChain::from_text("hi"))
        .await
        .expect_err("rejected");
    assert!(matches!(plain, SendMessageError::Rejected { code: 121, .. }));

    let with_all = harness
        .send(
            Contact::group(1),
            &MessageChain::builder()
                .element(MessageElement::MentionAll)
                .text(" hi")
                .build(),
        )
        .await
        .expect_err("rejected");
    assert!(matches!(
        with_all,
        SendMessageError::PolicyRejected {
            reason: PolicyReason::AtAllLimited,
            ..
        }
    ));
}

#[tokio::test]
async fn friends_report_policy_codes_verbatim() {
    let harness = Harness::new(Vec::new(), SendResponse::PolicyRejected(120));

    let err = harness
        .send(Contact::friend(1), &MessageChain::from_text("hi"))
        .await
        .expect_err("rejected");

    assert!(matches!(err, SendMessageError::Rejected { code: 120, .. }));
}

#[tokio::test]
async fn unavailable_service_is_reported() {
    let harness = Harness::new(Vec::new(), SendResponse::ServiceUnavailable);

    let err = harness
        .send(Contact::group(1), &MessageChain::from_text("hi"))
        .await
        .expect_err("unavailable");

    assert!(matches!(err, SendMessageError::ServiceUnavailable { .. }));
    assert_eq!(harness.session.sent().len(), 1);
}

#[tokio::test]
async fn missing_confirmations_yield_a_partial_receipt() {
    let settings = ClientSettings {
        receipt_timeout_ms: 30,
        ..ClientSettings::default()
    };
    let harness = Harness::with_settings(Vec::new(), SendResponse::Success, false, settings);

    let receipt = harness
        .send(Contact::group(1), &MessageChain::from_text("hi"))
        .await
        .expect("send");

    assert!(!receipt.is_resolved());
    assert_eq!(receipt.sequence_ids(), &SequenceIds::Partial(vec![None]));
    assert!(receipt.sequence_ids().best_effort().is_empty());
    assert_eq!(harness.components.correlator.subscription_count(), 0);
}

#[tokio::test]
async fn empty_and_oversized_chains_are_rejected_before_sending() {
    let settings = ClientSettings {
        max_text_chars: 10,
        ..ClientSettings::default()
    };
    let harness = Harness::with_settings(Vec::new(), SendResponse::Success, true, settings);

    let empty = harness
        .send(
            Contact::group(1),
            &MessageChain::builder().flag(Flag::DontAsLongMessage).build(),
        )
        .await
        .expect_err("empty");
    assert!(matches!(empty, SendMessageError::Validation { .. }));

    let oversized = MessageChain::from_text("01234567890");
    let err = harness
        .send(Contact::group(1), &oversized)
        .await
        .expect_err("oversized");
    assert!(matches!(err, SendMessageError::MessageTooLarge { .. }));
    assert!(harness.session.sent().is_empty());

    let unchecked = MessageChain::builder()
        .flag(Flag::IgnoreLengthCheck)
        .append(oversized)
        .build();
    harness
        .send(Contact::group(1), &unchecked)
        .await
        .expect("length check skipped");
    assert_eq!(harness.session.sent().len(), 1);
}

#[tokio::test]
async fn quoting_an_unresolved_source_sends_nothing() {
    let harness = Harness::new(Vec::new(), SendResponse::Success);
    let source = MessageSource::new(
        SourceKind::Group,
        7,
        1,
        0,
        vec![InternalId(1), InternalId(2)],
        SequenceIds::Partial(vec![Some(SequenceId(1)), None]),
        MessageChain::from_text("earlier"),
    );
    let chain = MessageChain::builder()
        .element(MessageElement::QuoteReply { source })
        .text("reply")
        .build();

    let err = harness
        .send(Contact::group(1), &chain)
        .await
        .expect_err("unresolved quote");

    assert!(matches!(err, SendMessageError::SequenceIdUnavailable(_)));
    assert!(harness.session.sent().is_empty());
}

#[tokio::test]
async fn transport_and_upload_failures_propagate() {
    let mut harness = Harness::new(vec![SendResponse::TooLarge], SendResponse::Success);
    harness.components.highway = Arc::new(MissingHighwayUploader);
    let err = harness
        .send(Contact::group(1), &MessageChain::from_text("hi"))
        .await
        .expect_err("upload");
    assert!(matches!(err, SendMessageError::Upload(_)));

    harness.components.session = Arc::new(MissingNetworkSession);
    let err = harness
        .send(Contact::group(1), &MessageChain::from_text("hi"))
        .await
        .expect_err("network");
    assert!(matches!(err, SendMessageError::Network(_)));
    assert_eq!(harness.components.correlator.subscription_count(), 0);
}

struct StalledHighway;

#[async_trait]
impl HighwayUploader for StalledHighway {
    async fn upload(&self, _target: &Contact, _nodes: &[ForwardNode], _is_long: bool) -> Result<String> {
        std::future::pending::<Result<String>>().await
    }
}

#[tokio::test]
async fn long_message_upload_is_bounded_by_the_upload_timeout() {
    let settings = ClientSettings {
        upload_timeout_ms: 20,
        ..ClientSettings::default()
    };
    let mut harness = Harness::with_settings(vec![SendResponse::TooLarge], SendResponse::Success, true, settings);
    harness.components.highway = Arc::new(StalledHighway);

    let err = harness
        .send(Contact::friend(7), &MessageChain::from_text("hi"))
        .await
        .expect_err("upload stalls");

    let SendMessageError::Timeout {
        target,
        operation,
        elapsed_ms,
    } = err
    else {
        panic!("timeout expected, got {err:?}");
    };
    assert_eq!(target, Contact::friend(7));
    assert_eq!(operation, TimedOperation::HighwayUpload);
    assert_eq!(elapsed_ms, 20);
    assert_eq!(harness.session.sent().len(), 1);
}

#[test]
fn steps_escalate_in_order_and_end() {
    assert_eq!(SendStep::First.next(), Some(SendStep::LongMessage));
    assert_eq!(SendStep::LongMessage.next(), Some(SendStep::Fragmented));
    assert_eq!(SendStep::Fragmented.next(), None);
    assert!(SendStep::First < SendStep::Fragmented);
}

#[test]
fn fragments_split_text_at_character_boundaries() {
    let parts = fragment_elements(vec![WireElement::text("你好世界")], 10);
    assert_eq!(
        parts,
        vec![vec![WireElement::text("你好")], vec![WireElement::text("世界")]]
    );
}

#[test]
fn fragments_keep_element_order_and_never_split_mentions() {
    let mention = WireElement::Text(shared::wire::TextElem {
        text: "@someone".to_string(),
        attr6_buf: crate::protocol::mention_attribute(8, Some(5)),
    });
    let elements = vec![
        WireElement::text("x".repeat(30)),
        mention.clone(),
        WireElement::text("tail"),
    ];

    let parts = fragment_elements(elements, 20);

    assert!(parts.iter().all(|part| !part.is_empty()));
    let flat: Vec<WireElement> = parts.into_iter().flatten().collect();
    assert!(flat.contains(&mention));
    let text: String = flat
        .iter()
        .filter_map(|element| match element {
            WireElement::Text(text) if text.attr6_buf.is_empty() => Some(text.text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, format!("{}tail", "x".repeat(30)));
}

#[test]
fn fragmenting_nothing_yields_one_empty_part() {
    assert_eq!(fragment_elements(Vec::new(), 100), vec![Vec::<WireElement>::new()]);
}
