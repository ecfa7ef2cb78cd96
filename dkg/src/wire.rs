//! Messages exchanged between committee members during key generation.
//!
//! Every message is framed as:
//!
//! ```text
//! session (u64, BE) | from (u32, BE) | tag (u8) | body
//! ```
//!
//! with the body determined by the tag:
//!
//! | tag | payload | body |
//! |---|---|---|
//! | 0 | [Payload::Commitment] | `count (varint)` followed by `count` compressed points |
//! | 1 | [Payload::Share] | `to (u32, BE)` followed by a little-endian scalar |
//! | 2 | [Payload::Ready] | compressed point |

use apm_cryptography::{
    babyjubjub::primitives::{
        group::{Point, Scalar},
        poly,
    },
    vss::Share,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};

const COMMITMENT_TAG: u8 = 0;
const SHARE_TAG: u8 = 1;
const READY_TAG: u8 = 2;

/// A message sent by the member at index `from` for `session`.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub session: u64,
    pub from: u32,
    pub payload: Payload,
}

impl Message {
    /// Returns the [Share] carried by the message, if any.
    pub fn share(&self) -> Option<Share> {
        match &self.payload {
            Payload::Share { to, share } => Some(Share {
                dealer: self.from,
                index: *to,
                private: *share,
            }),
            _ => None,
        }
    }
}

impl Write for Message {
    fn write(&self, buf: &mut impl BufMut) {
        self.session.write(buf);
        self.from.write(buf);
        self.payload.write(buf);
    }
}

impl Read for Message {
    /// The maximum number of coefficients accepted in a commitment.
    type Cfg = u32;

    fn read_cfg(buf: &mut impl Buf, max_coefficients: &u32) -> Result<Self, Error> {
        let session = u64::read(buf)?;
        let from = u32::read(buf)?;
        let payload = Payload::read_cfg(buf, max_coefficients)?;
        Ok(Self {
            session,
            from,
            payload,
        })
    }
}

impl EncodeSize for Message {
    fn encode_size(&self) -> usize {
        u64::SIZE + u32::SIZE + self.payload.encode_size()
    }
}

/// Content of a [Message].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// The sender's commitment to its secret polynomial (broadcast).
    Commitment(poly::Public),

    /// The evaluation of the sender's polynomial at `to` (unicast).
    Share { to: u32, share: Scalar },

    /// The joint public key computed by the sender (broadcast).
    Ready(Point),
}

impl Write for Payload {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Payload::Commitment(commitment) => {
                buf.put_u8(COMMITMENT_TAG);
                commitment.write(buf);
            }
            Payload::Share { to, share } => {
                buf.put_u8(SHARE_TAG);
                to.write(buf);
                share.write(buf);
            }
            Payload::Ready(public) => {
                buf.put_u8(READY_TAG);
                public.write(buf);
            }
        }
    }
}

impl Read for Payload {
    type Cfg = u32;

    fn read_cfg(buf: &mut impl Buf, max_coefficients: &u32) -> Result<Self, Error> {
        let tag = u8::read(buf)?;
        let result = match tag {
            COMMITMENT_TAG => {
                let max = *max_coefficients as usize;
                Payload::Commitment(poly::Public::read_cfg(buf, &max)?)
            }
            SHARE_TAG => Payload::Share {
                to: u32::read(buf)?,
                share: Scalar::read(buf)?,
            },
            READY_TAG => Payload::Ready(Point::read(buf)?),
            _ => return Err(Error::InvalidEnum(tag)),
        };
        Ok(result)
    }
}

impl EncodeSize for Payload {
    fn encode_size(&self) -> usize {
        1 + match self {
            Payload::Commitment(commitment) => commitment.encode_size(),
            Payload::Share { .. } => u32::SIZE + Scalar::SIZE,
            Payload::Ready(_) => Point::SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apm_cryptography::{babyjubjub::primitives::group::Element, vss::ops};
    use bytes::BytesMut;
    use commonware_codec::{Decode, Encode};
    use rand::{rngs::StdRng, SeedableRng};

    fn commitment(t: u32) -> poly::Public {
        let mut rng = StdRng::seed_from_u64(t as u64);
        ops::generate_polynomial(&mut rng, t).unwrap().1
    }

    #[test]
    fn test_commitment_codec() {
        let message = Message {
            session: 7,
            from: 2,
            payload: Payload::Commitment(commitment(3)),
        };
        let encoded = message.encode();
        assert_eq!(encoded.len(), message.encode_size());
        assert_eq!(Message::decode_cfg(encoded, &3).unwrap(), message);
    }

    #[test]
    fn test_share_codec() {
        let message = Message {
            session: 1,
            from: 3,
            payload: Payload::Share {
                to: 1,
                share: Scalar::from_u64(99),
            },
        };
        let decoded = Message::decode_cfg(message.encode(), &2).unwrap();
        assert_eq!(decoded, message);
        let share = decoded.share().unwrap();
        assert_eq!((share.dealer, share.index), (3, 1));
        assert_eq!(share.private, Scalar::from_u64(99));
    }

    #[test]
    fn test_ready_codec() {
        let message = Message {
            session: 1,
            from: 1,
            payload: Payload::Ready(Point::one()),
        };
        assert_eq!(Message::decode_cfg(message.encode(), &2).unwrap(), message);
        assert!(message.share().is_none());
    }

    #[test]
    fn test_too_many_coefficients() {
        let message = Message {
            session: 1,
            from: 1,
            payload: Payload::Commitment(commitment(4)),
        };
        assert!(matches!(
            Message::decode_cfg(message.encode(), &3),
            Err(Error::InvalidLength(4))
        ));
    }

    #[test]
    fn test_truncated() {
        let message = Message {
            session: 1,
            from: 1,
            payload: Payload::Commitment(commitment(2)),
        };
        let encoded = message.encode().freeze();
        let header = u64::SIZE + u32::SIZE;
        for len in [0, header, header + 2, encoded.len() - 1] {
            assert!(matches!(
                Message::decode_cfg(encoded.slice(..len), &2),
                Err(Error::EndOfBuffer)
            ));
        }
    }

    #[test]
    fn test_extra_data() {
        let message = Message {
            session: 1,
            from: 1,
            payload: Payload::Ready(Point::one()),
        };
        let mut buf = BytesMut::new();
        message.write(&mut buf);
        buf.put_u8(0);
        assert!(matches!(
            Message::decode_cfg(buf, &2),
            Err(Error::ExtraData(1))
        ));
    }

    #[test]
    fn test_invalid_tag() {
        let mut buf = BytesMut::new();
        buf.put_u64(1);
        buf.put_u32(1);
        buf.put_u8(9);
        assert!(matches!(
            Message::decode_cfg(buf, &2),
            Err(Error::InvalidEnum(9))
        ));
    }

    #[test]
    fn test_invalid_elements() {
        // Identity is never a valid point on the wire
        let mut buf = BytesMut::new();
        buf.put_u64(1);
        buf.put_u32(1);
        buf.put_u8(READY_TAG);
        buf.put_slice(&Point::zero().serialize());
        assert!(matches!(
            Message::decode_cfg(buf, &2),
            Err(Error::Invalid("Point", _))
        ));

        // Scalars must be reduced
        let mut buf = BytesMut::new();
        buf.put_u64(1);
        buf.put_u32(1);
        buf.put_u8(SHARE_TAG);
        buf.put_u32(2);
        buf.put_slice(&[0xff; 32]);
        assert!(matches!(
            Message::decode_cfg(buf, &2),
            Err(Error::Invalid("Scalar", _))
        ));
    }
}
