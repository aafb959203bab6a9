use std::{fmt, sync::OnceLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{InternalId, SequenceId, SourceKind, UserId},
    error::SourceError,
    wire::WireElement,
};

pub const MENTION_ALL_DISPLAY: &str = "@全体成员";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    PlainText,
    Mention,
    MentionAll,
    Face,
    Image,
    VipFace,
    MusicShare,
    FileReference,
    ForwardBundle,
    QuoteReply,
    MessageSourceMarker,
    InternalFlag,
    RichMessage,
}

impl ElementKind {
    /// Kinds a chain holds at most once.
    pub fn is_single_instance(self) -> bool {
        matches!(
            self,
            ElementKind::MessageSourceMarker
                | ElementKind::ForwardBundle
                | ElementKind::MusicShare
                | ElementKind::FileReference
        )
    }
}

/// Pipeline behaviour switches carried inside a chain. Never rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    IgnoreLengthCheck,
    ForceAsLongMessage,
    DontAsLongMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Png,
    Jpg,
    Gif,
    Bmp,
    Unknown,
}

impl ImageType {
    pub fn code(self) -> i32 {
        match self {
            ImageType::Png => 1001,
            ImageType::Jpg => 1000,
            ImageType::Gif => 2000,
            ImageType::Bmp => 1005,
            ImageType::Unknown => 0,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1001 => ImageType::Png,
            1000 => ImageType::Jpg,
            2000 => ImageType::Gif,
            1005 => ImageType::Bmp,
            _ => ImageType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}.ext`, the hex digits being the md5.
    pub image_id: String,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub image_type: ImageType,
    #[serde(default)]
    pub is_emoji: bool,
}

impl Image {
    /// Md5 digest recovered from the image id, or empty when the id is not in
    /// the canonical form.
    pub fn md5(&self) -> Vec<u8> {
        let stem = self.image_id.split('.').next().unwrap_or_default();
        let hex: String = stem
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect();
        if hex.len() != 32 {
            return Vec::new();
        }
        (0..32)
            .step_by(2)
            .filter_map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipFace {
    pub id: i32,
    pub name: String,
    pub count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicKind {
    NeteaseCloudMusic,
    QqMusic,
    MiguMusic,
    KugouMusic,
    KuwoMusic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicShare {
    pub kind: MusicKind,
    pub title: String,
    pub summary: String,
    pub jump_url: String,
    pub picture_url: String,
    pub music_url: String,
    pub brief: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub id: String,
    pub bus_id: i32,
    pub name: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardNode {
    pub sender_id: i64,
    pub time: i64,
    pub sender_name: String,
    pub chain: MessageChain,
}

impl ForwardNode {
    pub fn now(sender_id: i64, sender_name: impl Into<String>, chain: MessageChain) -> Self {
        Self {
            sender_id,
            time: Utc::now().timestamp(),
            sender_name: sender_name.into(),
            chain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardBundle {
    pub title: String,
    pub brief: String,
    pub summary: String,
    pub preview: Vec<String>,
    pub nodes: Vec<ForwardNode>,
}

/// Pointer to content stored out of band, or a raw service message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RichMessage {
    LongMessage { res_id: String, content: String },
    Forward { res_id: String, content: String },
    Service { service_id: i32, content: String },
}

impl RichMessage {
    pub const POINTER_SERVICE_ID: i32 = 35;

    pub fn service_id(&self) -> i32 {
        match self {
            RichMessage::LongMessage { .. } | RichMessage::Forward { .. } => {
                Self::POINTER_SERVICE_ID
            }
            RichMessage::Service { service_id, .. } => *service_id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            RichMessage::LongMessage { content, .. }
            | RichMessage::Forward { content, .. }
            | RichMessage::Service { content, .. } => content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MessageElement {
    PlainText { content: String },
    Mention { target: UserId, display: String },
    MentionAll,
    Face { id: i32 },
    Image(Image),
    VipFace(VipFace),
    MusicShare(MusicShare),
    FileReference(FileReference),
    ForwardBundle(ForwardBundle),
    QuoteReply { source: MessageSource },
    MessageSourceMarker { source: MessageSource },
    InternalFlag(Flag),
    RichMessage(RichMessage),
}

impl MessageElement {
    pub fn text(content: impl Into<String>) -> Self {
        MessageElement::PlainText {
            content: content.into(),
        }
    }

    pub fn mention(target: i64, display: impl Into<String>) -> Self {
        MessageElement::Mention {
            target: UserId(target),
            display: display.into(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            MessageElement::PlainText { .. } => ElementKind::PlainText,
            MessageElement::Mention { .. } => ElementKind::Mention,
            MessageElement::MentionAll => ElementKind::MentionAll,
            MessageElement::Face { .. } => ElementKind::Face,
            MessageElement::Image(_) => ElementKind::Image,
            MessageElement::VipFace(_) => ElementKind::VipFace,
            MessageElement::MusicShare(_) => ElementKind::MusicShare,
            MessageElement::FileReference(_) => ElementKind::FileReference,
            MessageElement::ForwardBundle(_) => ElementKind::ForwardBundle,
            MessageElement::QuoteReply { .. } => ElementKind::QuoteReply,
            MessageElement::MessageSourceMarker { .. } => ElementKind::MessageSourceMarker,
            MessageElement::InternalFlag(_) => ElementKind::InternalFlag,
            MessageElement::RichMessage(_) => ElementKind::RichMessage,
        }
    }

    /// Metadata elements describe the message instead of being part of it.
    pub fn is_content(&self) -> bool {
        !matches!(
            self,
            MessageElement::QuoteReply { .. }
                | MessageElement::MessageSourceMarker { .. }
                | MessageElement::InternalFlag(_)
        )
    }

    /// Human readable rendering; empty for metadata.
    pub fn content_string(&self) -> String {
        match self {
            MessageElement::PlainText { content } => content.clone(),
            MessageElement::Mention { display, .. } => display.clone(),
            MessageElement::MentionAll => MENTION_ALL_DISPLAY.to_string(),
            MessageElement::Face { id } => format!("[表情{id}]"),
            MessageElement::Image(image) if image.is_emoji => "[动画表情]".to_string(),
            MessageElement::Image(_) => "[图片]".to_string(),
            MessageElement::VipFace(face) => format!("[{}]x{}", face.name, face.count),
            MessageElement::MusicShare(share) => format!("[分享]{}", share.title),
            MessageElement::FileReference(file) => format!("[文件]{}", file.name),
            MessageElement::ForwardBundle(_) => "[转发消息]".to_string(),
            MessageElement::RichMessage(rich) => rich.content().to_string(),
            MessageElement::QuoteReply { .. }
            | MessageElement::MessageSourceMarker { .. }
            | MessageElement::InternalFlag(_) => String::new(),
        }
    }
}

impl From<Flag> for MessageElement {
    fn from(flag: Flag) -> Self {
        MessageElement::InternalFlag(flag)
    }
}

/// Ordered elements of one message. A chain holds at most one element of
/// each single-instance kind, deserialized chains included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MessageElement>", into = "Vec<MessageElement>")]
pub struct MessageChain(Vec<MessageElement>);

impl MessageChain {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> MessageChainBuilder {
        MessageChainBuilder::default()
    }

    pub fn from_text(content: impl Into<String>) -> Self {
        Self(vec![MessageElement::text(content)])
    }

    pub fn elements(&self) -> &[MessageElement] {
        &self.0
    }

    pub fn into_elements(self) -> Vec<MessageElement> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MessageElement> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_kind(&self, kind: ElementKind) -> bool {
        self.0.iter().any(|element| element.kind() == kind)
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        self.0
            .iter()
            .any(|element| matches!(element, MessageElement::InternalFlag(f) if *f == flag))
    }

    pub fn first_of(&self, kind: ElementKind) -> Option<&MessageElement> {
        self.0.iter().find(|element| element.kind() == kind)
    }

    pub fn source(&self) -> Option<&MessageSource> {
        self.0.iter().find_map(|element| match element {
            MessageElement::MessageSourceMarker { source } => Some(source),
            _ => None,
        })
    }

    pub fn quote(&self) -> Option<&MessageSource> {
        self.0.iter().find_map(|element| match element {
            MessageElement::QuoteReply { source } => Some(source),
            _ => None,
        })
    }

    pub fn content(&self) -> String {
        self.0.iter().map(MessageElement::content_string).collect()
    }

    /// At most `max_chars` characters of [`MessageChain::content`].
    pub fn take_content(&self, max_chars: usize) -> String {
        self.content().chars().take(max_chars).collect()
    }

    /// Characters of text the server counts against its length limit.
    pub fn text_len(&self) -> usize {
        self.0
            .iter()
            .map(|element| match element {
                MessageElement::PlainText { content } => content.chars().count(),
                MessageElement::Mention { display, .. } => display.chars().count(),
                MessageElement::MentionAll => MENTION_ALL_DISPLAY.chars().count(),
                MessageElement::RichMessage(rich) => rich.content().chars().count(),
                _ => 0,
            })
            .sum()
    }

    pub fn image_count(&self) -> usize {
        self.0
            .iter()
            .filter(|element| matches!(element, MessageElement::Image(_)))
            .count()
    }

    /// Returns a copy with `element` appended, keeping the single-marker rule.
    pub fn plus(&self, element: MessageElement) -> Self {
        let mut builder = MessageChainBuilder {
            elements: self.0.clone(),
        };
        builder.push(element);
        builder.build()
    }

    /// Copy of the chain without flags and source markers.
    pub fn without_metadata(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|element| {
                    !matches!(
                        element,
                        MessageElement::InternalFlag(_) | MessageElement::MessageSourceMarker { .. }
                    )
                })
                .cloned()
                .collect(),
        )
    }
}

impl fmt::Display for MessageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content())
    }
}

impl<'a> IntoIterator for &'a MessageChain {
    type Item = &'a MessageElement;
    type IntoIter = std::slice::Iter<'a, MessageElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for MessageChain {
    type Item = MessageElement;
    type IntoIter = std::vec::IntoIter<MessageElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<MessageElement> for MessageChain {
    fn from_iter<T: IntoIterator<Item = MessageElement>>(iter: T) -> Self {
        let mut builder = MessageChainBuilder::default();
        for element in iter {
            builder.push(element);
        }
        builder.build()
    }
}

impl From<MessageElement> for MessageChain {
    fn from(element: MessageElement) -> Self {
        Self(vec![element])
    }
}

impl From<Vec<MessageElement>> for MessageChain {
    fn from(elements: Vec<MessageElement>) -> Self {
        elements.into_iter().collect()
    }
}

impl From<MessageChain> for Vec<MessageElement> {
    fn from(chain: MessageChain) -> Self {
        chain.0
    }
}

#[derive(Debug, Default)]
pub struct MessageChainBuilder {
    elements: Vec<MessageElement>,
}

impl MessageChainBuilder {
    /// A later single-instance element replaces the earlier one of its kind in place.
    pub fn push(&mut self, element: MessageElement) -> &mut Self {
        let kind = element.kind();
        if kind.is_single_instance() {
            if let Some(existing) = self.elements.iter_mut().find(|e| e.kind() == kind) {
                *existing = element;
                return self;
            }
        }
        self.elements.push(element);
        self
    }

    pub fn element(mut self, element: MessageElement) -> Self {
        self.push(element);
        self
    }

    pub fn text(self, content: impl Into<String>) -> Self {
        self.element(MessageElement::text(content))
    }

    pub fn flag(self, flag: Flag) -> Self {
        self.element(MessageElement::InternalFlag(flag))
    }

    pub fn append(mut self, chain: MessageChain) -> Self {
        for element in chain {
            self.push(element);
        }
        self
    }

    pub fn build(self) -> MessageChain {
        MessageChain(self.elements)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "ids", rename_all = "snake_case")]
pub enum SequenceIds {
    Resolved(Vec<SequenceId>),
    /// Some confirmations never arrived; `None` marks the missing ones.
    Partial(Vec<Option<SequenceId>>),
}

impl SequenceIds {
    pub fn from_partial(ids: Vec<Option<SequenceId>>) -> Self {
        if ids.iter().all(Option::is_some) {
            SequenceIds::Resolved(ids.into_iter().flatten().collect())
        } else {
            SequenceIds::Partial(ids)
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, SequenceIds::Resolved(_))
    }

    /// Resolved ids, with unresolved entries skipped.
    pub fn best_effort(&self) -> Vec<SequenceId> {
        match self {
            SequenceIds::Resolved(ids) => ids.clone(),
            SequenceIds::Partial(ids) => ids.iter().flatten().copied().collect(),
        }
    }
}

/// Identity of a message that was sent or received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSource {
    pub kind: SourceKind,
    pub from_id: i64,
    pub target_id: i64,
    pub time: i64,
    pub internal_ids: Vec<InternalId>,
    pub sequence_ids: SequenceIds,
    pub original: MessageChain,
    #[serde(skip)]
    encoded: OnceLock<WireElement>,
}

impl MessageSource {
    pub fn new(
        kind: SourceKind,
        from_id: i64,
        target_id: i64,
        time: i64,
        internal_ids: Vec<InternalId>,
        sequence_ids: SequenceIds,
        original: MessageChain,
    ) -> Self {
        Self {
            kind,
            from_id,
            target_id,
            time,
            internal_ids,
            sequence_ids,
            original,
            encoded: OnceLock::new(),
        }
    }

    /// Sequence ids a dependent operation (such as quoting) may rely on.
    pub fn ensure_available(&self) -> Result<&[SequenceId], SourceError> {
        match &self.sequence_ids {
            SequenceIds::Resolved(ids) => Ok(ids),
            SequenceIds::Partial(_) => Err(SourceError::SequenceIdUnavailable {
                kind: self.kind,
                internal_ids: self.internal_ids.clone(),
            }),
        }
    }

    /// Wire form of this source, computed on first use and shared afterwards.
    pub fn encoded_or_try_init<E>(
        &self,
        init: impl FnOnce(&Self) -> Result<WireElement, E>,
    ) -> Result<&WireElement, E> {
        if let Some(encoded) = self.encoded.get() {
            return Ok(encoded);
        }
        let value = init(self)?;
        Ok(self.encoded.get_or_init(|| value))
    }

    pub fn is_encoded(&self) -> bool {
        self.encoded.get().is_some()
    }
}

impl PartialEq for MessageSource {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.from_id == other.from_id
            && self.target_id == other.target_id
            && self.time == other.time
            && self.internal_ids == other.internal_ids
            && self.sequence_ids == other.sequence_ids
            && self.original == other.original
    }
}

impl Eq for MessageSource {}
