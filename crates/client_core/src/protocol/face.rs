use shared::{
    message::{ElementKind, MessageElement},
    wire::{FaceElem, WireElement},
};

use super::{
    DecoderContext, EncoderContext, MessageDecoder, MessageEncoder, MessageProtocol,
    ProcessorCollector,
};
use crate::error::CodecError;

const FACE_BUF: [u8; 8] = [0x00, 0x01, 0x00, 0x04, 0x52, 0xCC, 0xF5, 0xD0];
const OLD_FACE_BASE: i32 = 0x1441;

pub struct FaceProtocol;

impl MessageProtocol for FaceProtocol {
    fn name(&self) -> &'static str {
        "face"
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::Face, FaceEncoder);
        collector.add_decoder(FaceDecoder);
    }
}

struct FaceEncoder;

impl MessageEncoder for FaceEncoder {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        let MessageElement::Face { id } = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        let old = (OLD_FACE_BASE.wrapping_add(*id) as u16).to_be_bytes().to_vec();
        ctx.collect(WireElement::Face(FaceElem {
            index: *id,
            old,
            buf: FACE_BUF.to_vec(),
        }));
        Ok(())
    }
}

struct FaceDecoder;

impl MessageDecoder for FaceDecoder {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        let WireElement::Face(face) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        ctx.collect(MessageElement::Face { id: face.index });
        Ok(())
    }
}
