use shared::{
    message::{ElementKind, Image, ImageType, MessageElement},
    wire::{ImageElem, WireElement},
};

use super::{
    DecoderContext, EncoderContext, MessageDecoder, MessageEncoder, MessageProtocol,
    ProcessorCollector,
};
use crate::error::CodecError;

pub struct ImageProtocol;

impl MessageProtocol for ImageProtocol {
    fn name(&self) -> &'static str {
        "image"
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::Image, ImageEncoder);
        collector.add_decoder(ImageDecoder);
    }
}

struct ImageEncoder;

impl MessageEncoder for ImageEncoder {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        let MessageElement::Image(image) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        let elem = ImageElem {
            file_path: image.image_id.clone(),
            md5: image.md5(),
            width: image.width,
            height: image.height,
            size: image.size,
            image_type: image.image_type.code(),
            biz_type: i32::from(image.is_emoji),
        };
        if ctx.attributes().contact.is_group() {
            ctx.collect(WireElement::CustomFace(elem));
        } else {
            ctx.collect(WireElement::NotOnlineImage(elem));
        }
        Ok(())
    }
}

struct ImageDecoder;

impl MessageDecoder for ImageDecoder {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        let (WireElement::CustomFace(elem) | WireElement::NotOnlineImage(elem)) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        ctx.collect(MessageElement::Image(Image {
            image_id: elem.file_path.clone(),
            width: elem.width,
            height: elem.height,
            size: elem.size,
            image_type: ImageType::from_code(elem.image_type),
            is_emoji: elem.biz_type != 0,
        }));
        Ok(())
    }
}
