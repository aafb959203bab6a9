use async_trait::async_trait;
use shared::{
    message::{ElementKind, FileReference, MessageElement},
    protocol::OutgoingPacket,
    wire::{TransElem, WireElement},
};

use super::{
    DecoderContext, EncoderContext, MessageDecoder, MessageEncoder, MessageProtocol,
    ProcessorCollector,
};
use crate::{
    error::{CodecError, SendMessageError},
    outgoing::{OutgoingContext, OutgoingProcessor},
    send::SendMessageHandler,
};

const FILE_ELEM_TYPE: i32 = 24;
const FILE_VALUE_TAG: u8 = 1;

pub struct FileMessageProtocol;

impl MessageProtocol for FileMessageProtocol {
    fn name(&self) -> &'static str {
        "file"
    }

    fn collect_processors(&self, collector: &mut ProcessorCollector) {
        collector.add_encoder(ElementKind::FileReference, FileEncoder);
        collector.add_decoder(FileDecoder);
        collector.add_sender(FileFeedSender);
    }
}

fn malformed(reason: impl Into<String>) -> CodecError {
    CodecError::Malformed {
        element: "file",
        reason: reason.into(),
    }
}

fn put_string(out: &mut Vec<u8>, value: &str) -> Result<(), CodecError> {
    let len = u16::try_from(value.len()).map_err(|_| malformed("string longer than 65535 bytes"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// `tag, (u16 length, record)*` where a record is
/// `bus_id i32, size i64, id, name` and strings are u16-length prefixed.
fn encode_value(file: &FileReference) -> Result<Vec<u8>, CodecError> {
    let mut record = Vec::new();
    record.extend_from_slice(&file.bus_id.to_be_bytes());
    record.extend_from_slice(&file.size.to_be_bytes());
    put_string(&mut record, &file.id)?;
    put_string(&mut record, &file.name)?;

    let len = u16::try_from(record.len()).map_err(|_| malformed("record too long"))?;
    let mut value = vec![FILE_VALUE_TAG];
    value.extend_from_slice(&len.to_be_bytes());
    value.extend_from_slice(&record);
    Ok(value)
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.bytes.len() < n {
            return Err(malformed(format!(
                "needed {n} bytes, {} remaining",
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(buf))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        String::from_utf8(self.take(len)?.to_vec()).map_err(|err| malformed(err.to_string()))
    }
}

fn decode_value(value: &[u8]) -> Result<Vec<FileReference>, CodecError> {
    let Some((&tag, rest)) = value.split_first() else {
        return Ok(Vec::new());
    };
    if tag != FILE_VALUE_TAG {
        return Ok(Vec::new());
    }
    let mut reader = Reader { bytes: rest };
    let mut files = Vec::new();
    while !reader.bytes.is_empty() {
        let len = reader.u16()? as usize;
        let mut record = Reader {
            bytes: reader.take(len)?,
        };
        let bus_id = record.i32()?;
        let size = record.i64()?;
        let id = record.string()?;
        let name = record.string()?;
        files.push(FileReference {
            id,
            bus_id,
            name,
            size,
        });
    }
    Ok(files)
}

struct FileEncoder;

impl MessageEncoder for FileEncoder {
    fn encode(&self, element: &MessageElement, ctx: &mut EncoderContext<'_>) -> Result<(), CodecError> {
        let MessageElement::FileReference(file) = element else {
            return Ok(());
        };
        ctx.mark_as_consumed();
        ctx.collect(WireElement::TransElem(TransElem {
            elem_type: FILE_ELEM_TYPE,
            elem_value: encode_value(file)?,
        }));
        Ok(())
    }
}

struct FileDecoder;

impl MessageDecoder for FileDecoder {
    fn decode(&self, element: &WireElement, ctx: &mut DecoderContext<'_>) -> Result<(), CodecError> {
        let WireElement::TransElem(trans) = element else {
            return Ok(());
        };
        if trans.elem_type != FILE_ELEM_TYPE {
            return Ok(());
        }
        ctx.mark_as_consumed();
        ctx.collect_all(decode_value(&trans.elem_value)?.into_iter().map(MessageElement::FileReference));
        Ok(())
    }
}

/// Files are announced to a group through a feed instead of a message.
struct FileFeedSender;

#[async_trait]
impl OutgoingProcessor for FileFeedSender {
    async fn process(&self, ctx: &mut OutgoingContext) -> Result<(), SendMessageError> {
        let Some(MessageElement::FileReference(file)) =
            ctx.current().first_of(ElementKind::FileReference)
        else {
            return Ok(());
        };
        let file = file.clone();
        let components = ctx.components().clone();
        let target = ctx.target().clone();
        let chain = ctx.current().clone();

        let handler = SendMessageHandler::new(&components, &target);
        if !handler.strategy().supports_file_feed() {
            return Err(SendMessageError::Validation {
                target: target.clone(),
                reason: "file messages can only be sent to groups".to_string(),
            });
        }
        let receipt = handler
            .send_special(&chain, |internal_id| OutgoingPacket::FileFeed {
                target: target.clone(),
                internal_id,
                file,
            })
            .await?;
        ctx.collect_receipt(receipt);
        ctx.mark_as_consumed();
        Ok(())
    }
}
