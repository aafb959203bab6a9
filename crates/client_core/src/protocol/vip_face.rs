use shared::{
    message::{ElementKind, MessageElement, VipFace},
    wire::{CommonElem, WireElement},
};

use super::{
    DecoderContext, EncoderContext, MessageDecoder, MessageEncoder, MessageProtocol,
    ProcessorCollector,
};
use crate::error::CodecError;

const VIP_FACE_SERVICE_TYPE: i32 = 23;

pub struct VipFaceProtocol;

impl MessageProtocol for VipFaceProtocol {
    fn name(&self) -> &'static str {
        "vip_face"
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::VipFace, VipFaceEncoder);
        collector.add_decoder(VipFaceDecoder);
    }
}

struct VipFaceEncoder;

impl MessageEncoder for VipFaceEncoder {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        let MessageElement::VipFace(face) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        let mut pb_elem = Vec::with_capacity(8 + face.name.len());
        pb_elem.extend_from_slice(&face.id.to_be_bytes());
        pb_elem.extend_from_slice(&face.count.to_be_bytes());
        pb_elem.extend_from_slice(face.name.as_bytes());
        ctx.collect(WireElement::CommonElem(CommonElem {
            service_type: VIP_FACE_SERVICE_TYPE,
            business_type: face.id,
            pb_elem,
        }));
        Ok(())
    }
}

struct VipFaceDecoder;

impl MessageDecoder for VipFaceDecoder {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        let WireElement::CommonElem(common) = element else {
            return Ok(());
        };
        if common.service_type != VIP_FACE_SERVICE_TYPE {
            return Ok(());
        }
        ctx.mark_as_consumed();
        let pb = &common.pb_elem;
        if pb.len() < 8 {
            return Err(CodecError::Malformed {
                element: "vip face",
                reason: format!("payload of {} bytes is shorter than its header", pb.len()),
            });
        }
        let name = String::from_utf8(pb[8..].to_vec()).map_err(|err| CodecError::Malformed {
            element: "vip face",
            reason: err.to_string(),
        })?;
        ctx.collect(MessageElement::VipFace(VipFace {
            id: i32::from_be_bytes([pb[0], pb[1], pb[2], pb[3]]),
            count: i32::from_be_bytes([pb[4], pb[5], pb[6], pb[7]]),
            name,
        }));
        Ok(())
    }
}
