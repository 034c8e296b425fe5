//! Wire-Format fuer den TCP-Transport
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Envelope.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Ein Frame mit unbrauchbarem JSON zerstoert den Stream nicht: die
//! Frame-Grenze ist bekannt, der Decoder liefert `Decoded::Malformed` und
//! liest danach normal weiter. Nur ein zu grosser Frame ist fatal.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::{Decoded, Envelope};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] io::Error),

    #[error("Frame zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)")]
    FrameZuGross { laenge: usize, maximum: usize },

    #[error("JSON-Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer `Framed<TcpStream, FrameCodec>`
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Decoded;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let laenge = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if laenge > self.max_frame_size {
            return Err(WireError::FrameZuGross {
                laenge,
                maximum: self.max_frame_size,
            });
        }

        let gesamt = LENGTH_FIELD_SIZE + laenge;
        if src.len() < gesamt {
            src.reserve(gesamt - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(laenge);

        Ok(Some(Envelope::decode_bytes(&payload)))
    }
}

impl Encoder<Envelope> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;

        if json.len() > self.max_frame_size {
            return Err(WireError::FrameZuGross {
                laenge: json.len(),
                maximum: self.max_frame_size,
            });
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Message, NumberCalled};
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{Framed, FramedRead};

    fn nummer(n: u32) -> Envelope {
        Envelope::mit_zeitstempel(Message::NumberCalled(NumberCalled { number: n }), 1000 + n as i64)
    }

    fn roh_frame(buf: &mut BytesMut, payload: &[u8]) {
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);
    }

    #[test]
    fn unvollstaendiger_frame_wartet() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(nummer(1), &mut buf).unwrap();

        let haelfte = buf.len() / 2;
        let mut teil = buf.split_to(haelfte);
        assert!(codec.decode(&mut teil).unwrap().is_none());
    }

    #[test]
    fn zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_ist_fatal() {
        let mut codec = FrameCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        roh_frame(&mut buf, &[b'x'; 200]);

        let ergebnis = codec.decode(&mut buf);
        assert!(matches!(
            ergebnis,
            Err(WireError::FrameZuGross { laenge: 200, maximum: 100 })
        ));
    }

    #[test]
    fn encode_lehnt_zu_grosse_nachricht_ab() {
        let mut codec = FrameCodec::with_max_size(10);
        let mut buf = BytesMut::new();
        assert!(codec.encode(nummer(1), &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn kaputtes_json_wird_malformed_und_stream_laeuft_weiter() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        roh_frame(&mut buf, b"{nicht json");
        codec.encode(nummer(7), &mut buf).unwrap();

        let erstes = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert!(matches!(erstes, Decoded::Malformed { .. }));

        let zweites = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(zweites, Decoded::Envelope(nummer(7)));
        assert!(buf.is_empty());
    }

    #[test]
    fn mehrere_nachrichten_in_reihenfolge() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for i in 0..3 {
            codec.encode(nummer(i), &mut buf).unwrap();
        }
        for i in 0..3 {
            let decoded = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
            assert_eq!(decoded, Decoded::Envelope(nummer(i)));
        }
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn framed_ueber_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut sender = Framed::new(client, FrameCodec::new());
        let mut empfaenger = FramedRead::new(server, FrameCodec::new());

        sender.send(nummer(11)).await.unwrap();
        sender.send(nummer(12)).await.unwrap();
        drop(sender);

        let a = empfaenger.next().await.unwrap().unwrap();
        let b = empfaenger.next().await.unwrap().unwrap();
        assert_eq!(a, Decoded::Envelope(nummer(11)));
        assert_eq!(b, Decoded::Envelope(nummer(12)));
        assert!(empfaenger.next().await.is_none());
    }
}
