//! Low-level message elements as the remote protocol carries them.
//!
//! The byte-level framing of these structures belongs to the transport; the
//! codec only ever builds and inspects them field by field.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WireElement {
    Text(TextElem),
    Face(FaceElem),
    /// Image as it appears in group chats.
    CustomFace(ImageElem),
    /// Image as it appears in private chats.
    NotOnlineImage(ImageElem),
    CommonElem(CommonElem),
    RichMsg(RichMsgElem),
    TransElem(TransElem),
    SrcMsg(SourceMsg),
    GeneralFlags(GeneralFlags),
    ElemFlags2,
}

impl WireElement {
    pub fn text(text: impl Into<String>) -> Self {
        WireElement::Text(TextElem {
            text: text.into(),
            attr6_buf: Vec::new(),
        })
    }

    /// Rough number of bytes the element occupies once serialized.
    pub fn estimated_size(&self) -> usize {
        match self {
            WireElement::Text(text) => text.text.len() + text.attr6_buf.len() + 4,
            WireElement::Face(face) => face.old.len() + face.buf.len() + 8,
            WireElement::CustomFace(image) | WireElement::NotOnlineImage(image) => {
                image.file_path.len() + image.md5.len() + 64
            }
            WireElement::CommonElem(common) => common.pb_elem.len() + 8,
            WireElement::RichMsg(rich) => rich.template.len() + 8,
            WireElement::TransElem(trans) => trans.elem_value.len() + 4,
            WireElement::SrcMsg(source) => {
                source.elems.iter().map(WireElement::estimated_size).sum::<usize>()
                    + source.orig_seqs.len() * 4
                    + 32
            }
            WireElement::GeneralFlags(flags) => flags.long_text_resid.len() + 8,
            WireElement::ElemFlags2 => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextElem {
    pub text: String,
    /// Mention attribute buffer; empty for ordinary text.
    #[serde(default)]
    pub attr6_buf: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceElem {
    pub index: i32,
    pub old: Vec<u8>,
    #[serde(default)]
    pub buf: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageElem {
    pub file_path: String,
    pub md5: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub image_type: i32,
    /// Non-zero when the image is shown as a sticker.
    #[serde(default)]
    pub biz_type: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonElem {
    pub service_type: i32,
    pub business_type: i32,
    pub pb_elem: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichMsgElem {
    pub service_id: i32,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransElem {
    pub elem_type: i32,
    pub elem_value: Vec<u8>,
}

/// Quoted-message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMsg {
    pub orig_seqs: Vec<i32>,
    pub sender_uin: i64,
    pub to_uin: i64,
    pub time: i64,
    pub elems: Vec<WireElement>,
    /// Internal ids of the quoted message, widened to unsigned.
    pub orig_uids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralFlags {
    pub long_text_flag: i32,
    #[serde(default)]
    pub long_text_resid: String,
}
