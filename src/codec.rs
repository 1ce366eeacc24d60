//! MLLP framing as a tokio codec.
//!
//! HL7's MLLP wraps every message in a single start-block byte and a two byte
//! end-block/carriage-return footer. There is no escaping: a payload that
//! contains the footer itself cannot be framed unambiguously.

use bytes::buf::{Buf, BufMut};
use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use tokio_util::codec::{Decoder, Encoder};

/// Vertical-Tab char, the marker for the start of a message
pub const START_BLOCK: u8 = 0x0B;
/// File-Separator char, the marker for the end of a message
pub const END_BLOCK: u8 = 0x1C;
/// CR, always sent directly after the end block
pub const CARRIAGE_RETURN: u8 = 0x0D;

/// Encoder/decoder for MLLP frames.
///
/// Encoding is stateless. Decoding keeps any partial frame between calls so a
/// message split over several socket reads is still yielded whole.
#[derive(Debug, Default)]
pub struct MllpCodec {
    // bytes of a frame whose footer hasn't arrived yet
    pending: BytesMut,
}

impl MllpCodec {
    const BLOCK_FOOTER: [u8; 2] = [END_BLOCK, CARRIAGE_RETURN];

    /// Creates a new codec instance, generally for use within a
    /// [`tokio_util::codec::Framed`], but usable standalone for framing
    /// one-off buffers.
    /// ```
    /// use hl7_mllp_sender::MllpCodec;
    /// let mllp = MllpCodec::new();
    /// ```
    pub fn new() -> Self {
        MllpCodec {
            pending: BytesMut::new(),
        }
    }

    /// Wraps `payload` in an MLLP envelope.
    pub fn frame(payload: &[u8]) -> Bytes {
        let mut dst = BytesMut::with_capacity(payload.len() + 3);
        put_frame(payload, &mut dst);
        dst.freeze()
    }

    /// Strips the envelope from a complete frame, ignoring any bytes before
    /// the start block. Returns `None` if `data` doesn't hold a whole frame.
    pub fn unframe(data: &[u8]) -> Option<Bytes> {
        let mut buf = BytesMut::from(data);
        decode_frame(&mut buf).map(BytesMut::freeze)
    }

    fn get_footer_position(src: &[u8]) -> Option<usize> {
        src.windows(2).position(|w| w == MllpCodec::BLOCK_FOOTER)
    }
}

fn put_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + 3); // header + footer on top of the message proper
    dst.put_u8(START_BLOCK);
    dst.put_slice(payload);
    dst.put_slice(&MllpCodec::BLOCK_FOOTER);
}

// Used both for outbound HL7 messages and for any ACK sent back by a listener.
impl Encoder<BytesMut> for MllpCodec {
    type Error = std::io::Error;

    fn encode(&mut self, event: BytesMut, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_frame(&event, dst);
        debug!("MLLP: Encoded {} payload bytes for send", event.len());
        Ok(())
    }
}

impl Encoder<Bytes> for MllpCodec {
    type Error = std::io::Error;

    fn encode(&mut self, event: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_frame(&event, dst);
        debug!("MLLP: Encoded {} payload bytes for send", event.len());
        Ok(())
    }
}

impl Decoder for MllpCodec {
    type Item = BytesMut;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // MLLP is synchronous: a sender waits for the ACK before the next
        // message, so at most one frame is expected per read. Anything after a
        // footer stays in `src` for the next call.
        if self.pending.is_empty() {
            trace!("MLLP: Operating on passed buffer only");
            if let Some(message) = decode_frame(src) {
                return Ok(Some(message));
            }
            self.pending.put_slice(src);
            src.advance(src.len());
            return Ok(None);
        }

        trace!("MLLP: Operating on concat of previous and current buffers");
        self.pending.put_slice(src);
        src.advance(src.len());

        match decode_frame(&mut self.pending) {
            Some(message) => {
                // hand back anything trailing the footer
                src.put_slice(&self.pending);
                self.pending.clear();
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}

/// Splits one frame off the front of `buf`, dropping noise before the header.
fn decode_frame(buf: &mut BytesMut) -> Option<BytesMut> {
    let start = match buf.iter().position(|b| *b == START_BLOCK) {
        Some(start) => start,
        None => {
            // per MLLP, bytes outside a block are ignored
            buf.clear();
            return None;
        }
    };
    buf.advance(start);

    let end = MllpCodec::get_footer_position(&buf[1..])? + 1;
    trace!("MLLP: Found footer at index {}", end);

    let mut message = buf.split_to(end + MllpCodec::BLOCK_FOOTER.len());
    message.truncate(end); // lose the footer
    message.advance(1); // and the header
    Some(message)
}
