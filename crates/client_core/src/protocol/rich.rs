use shared::{
    message::{ElementKind, ForwardBundle, MessageElement, RichMessage},
    wire::{GeneralFlags, RichMsgElem, WireElement},
};

use super::{
    DecoderContext, EncoderContext, MessageDecoder, MessageEncoder, MessageProtocol,
    ProcessorCollector,
};
use crate::error::CodecError;

pub struct RichMessageProtocol;

impl MessageProtocol for RichMessageProtocol {
    fn name(&self) -> &'static str {
        "rich_message"
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::RichMessage, RichMessageEncoder);
        collector.add_decoder(RichMessageDecoder);
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn attribute<'a>(template: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}=\"");
    let start = template.find(&needle)? + needle.len();
    let len = template[start..].find('"')?;
    Some(&template[start..start + len])
}

pub fn long_message_template(brief: &str, res_id: &str) -> String {
    let brief = escape_xml(brief);
    let res_id = escape_xml(res_id);
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><msg serviceID="35" templateID="1" action="viewMultiMsg" brief="{brief}" m_resid="{res_id}" m_fileName="{res_id}" sourceMsgId="0" url="" flag="3" adverSign="0" multiMsgFlag="1"><item layout="1"><title>{brief}</title><hr hidden="false" style="0"/><summary>点击查看完整消息</summary></item><source name="聊天记录" icon="" action="" appid="-1"/></msg>"#
    )
}

pub fn forward_template(bundle: &ForwardBundle, res_id: &str) -> String {
    let previews: String = bundle
        .preview
        .iter()
        .map(|line| {
            format!(
                r##"<title size="26" color="#777777" maxLines="2" lineSpace="12">{}</title>"##,
                escape_xml(line)
            )
        })
        .collect();
    format!(
        r##"<?xml version="1.0" encoding="utf-8"?><msg serviceID="35" templateID="1" action="viewMultiMsg" brief="{brief}" m_resid="{res_id}" m_fileName="{res_id}" tSum="{count}" sourceMsgId="0" url="" flag="3" adverSign="0" multiMsgFlag="0"><item layout="1" advertiser_id="0" aid="0"><title size="34" maxLines="2" lineSpace="12">{title}</title>{previews}<hr hidden="false" style="0"/><summary size="26" color="#777777">{summary}</summary></item><source name="聊天记录" icon="" action="" appid="-1"/></msg>"##,
        brief = escape_xml(&bundle.brief),
        res_id = escape_xml(res_id),
        count = bundle.nodes.len(),
        title = escape_xml(&bundle.title),
        summary = escape_xml(&bundle.summary),
    )
}

struct RichMessageEncoder;

impl MessageEncoder for RichMessageEncoder {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        let MessageElement::RichMessage(rich) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        ctx.collect(WireElement::RichMsg(RichMsgElem {
            service_id: rich.service_id(),
            template: rich.content().to_string(),
        }));
        if let RichMessage::LongMessage { res_id, .. } = rich {
            ctx.collect(WireElement::GeneralFlags(GeneralFlags {
                long_text_flag: 1,
                long_text_resid: res_id.clone(),
            }));
        }
        Ok(())
    }
}

struct RichMessageDecoder;

impl MessageDecoder for RichMessageDecoder {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        let WireElement::RichMsg(rich) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        let content = rich.template.clone();
        let pointer = (rich.service_id == RichMessage::POINTER_SERVICE_ID)
            .then(|| attribute(&content, "m_resid"))
            .flatten()
            .map(|res_id| (res_id.to_string(), attribute(&content, "multiMsgFlag") == Some("1")));
        let message = match pointer {
            Some((res_id, true)) => RichMessage::LongMessage { res_id, content },
            Some((res_id, false)) => RichMessage::Forward { res_id, content },
            None => RichMessage::Service {
                service_id: rich.service_id,
                content,
            },
        };
        ctx.collect(MessageElement::RichMessage(message));
        Ok(())
    }
}
