//! End-of-message detection.
//!
//! ## Short-datagram framing (default)
//!
//! Datagrams carry raw image bytes and nothing else. A datagram shorter than
//! the read capacity `C` ends the message; one of exactly `C` bytes means more
//! follow. A message whose last fragment happens to be exactly `C` bytes long
//! is therefore not recognised as finished and the receiver keeps waiting.
//! [`split`] avoids that on the sending side by appending an empty datagram.
//!
//! ## Length-prefixed framing
//!
//! | Datagram | Layout |
//! |----------|--------|
//! | first    | `[magic:4 "CVLP"][total_len:4 BE][payload...]` |
//! | rest     | `[payload...]` |
//!
//! The message ends once `total_len` payload bytes have arrived, whatever the
//! individual datagram sizes were.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Magic bytes opening a length-prefixed message.
pub const LENGTH_PREFIX_MAGIC: [u8; 4] = *b"CVLP";

/// Length-prefix header size in bytes.
pub const LENGTH_PREFIX_HEADER_LEN: usize = 8;

/// How the receiver decides a message is complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Framing {
    /// A datagram shorter than the read capacity is the final fragment.
    #[default]
    ShortDatagram,
    /// The first datagram declares the total payload length.
    LengthPrefixed,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortDatagram => f.write_str("short"),
            Self::LengthPrefixed => f.write_str("length"),
        }
    }
}

impl FromStr for Framing {
    type Err = FramingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" | "short-datagram" => Ok(Self::ShortDatagram),
            "length" | "length-prefixed" => Ok(Self::LengthPrefixed),
            other => Err(FramingError::UnknownMode(other.to_owned())),
        }
    }
}

/// Framing violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// First datagram too short to hold the length prefix.
    #[error("datagram of {0} bytes cannot hold the length prefix")]
    MissingHeader(usize),
    /// First datagram does not start with [`LENGTH_PREFIX_MAGIC`].
    #[error("bad length-prefix magic {0:02x?}")]
    BadMagic([u8; 4]),
    /// More payload arrived than the header declared.
    #[error("received {received} bytes but header declared {declared}")]
    Overrun { declared: usize, received: usize },
    /// Capacity too small to carry the header plus payload.
    #[error("capacity {0} is too small for the framing mode")]
    CapacityTooSmall(usize),
    /// Message longer than the header can describe.
    #[error("message of {0} bytes exceeds the length prefix range")]
    TooLong(usize),
    /// Unrecognised framing name.
    #[error("unknown framing mode {0:?} (expected \"short\" or \"length\")")]
    UnknownMode(String),
}

/// Whether a message needs more datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Keep reading.
    More,
    /// The datagram just accepted was the final fragment.
    Complete,
}

/// Per-message delimiter state.
#[derive(Debug)]
pub(crate) struct Delimiter {
    framing: Framing,
    capacity: usize,
    declared: Option<usize>,
    received: usize,
}

impl Delimiter {
    pub(crate) const fn new(framing: Framing, capacity: usize) -> Self {
        Self {
            framing,
            capacity,
            declared: None,
            received: 0,
        }
    }

    /// Classifies one datagram and returns the slice that belongs to the image.
    pub(crate) fn accept<'a>(
        &mut self,
        datagram: &'a [u8],
    ) -> Result<(&'a [u8], Progress), FramingError> {
        match self.framing {
            Framing::ShortDatagram => {
                let progress = if datagram.len() < self.capacity {
                    Progress::Complete
                } else {
                    Progress::More
                };
                Ok((datagram, progress))
            }
            Framing::LengthPrefixed => self.accept_prefixed(datagram),
        }
    }

    fn accept_prefixed<'a>(
        &mut self,
        datagram: &'a [u8],
    ) -> Result<(&'a [u8], Progress), FramingError> {
        let (declared, payload) = match self.declared {
            Some(declared) => (declared, datagram),
            None => {
                let (declared, payload) = parse_header(datagram)?;
                self.declared = Some(declared);
                (declared, payload)
            }
        };

        let received = self.received + payload.len();
        if received > declared {
            return Err(FramingError::Overrun { declared, received });
        }
        self.received = received;

        let progress = if received == declared {
            Progress::Complete
        } else {
            Progress::More
        };
        Ok((payload, progress))
    }
}

fn parse_header(datagram: &[u8]) -> Result<(usize, &[u8]), FramingError> {
    if datagram.len() < LENGTH_PREFIX_HEADER_LEN {
        return Err(FramingError::MissingHeader(datagram.len()));
    }
    let (header, payload) = datagram.split_at(LENGTH_PREFIX_HEADER_LEN);

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&header[..4]);
    if magic != LENGTH_PREFIX_MAGIC {
        return Err(FramingError::BadMagic(magic));
    }

    let mut len = [0u8; 4];
    len.copy_from_slice(&header[4..]);
    Ok((u32::from_be_bytes(len) as usize, payload))
}

/// Splits an encoded image into the datagrams a receiver with read capacity
/// `capacity` will reassemble back into `image`.
///
/// With [`Framing::ShortDatagram`] an empty terminator datagram is appended
/// whenever the last chunk would be exactly `capacity` bytes (including for
/// an empty image).
///
/// # Errors
///
/// Returns an error if `capacity` cannot hold a length prefix plus payload,
/// or the image is too long to describe in one.
pub fn split(
    image: &[u8],
    capacity: usize,
    framing: Framing,
) -> Result<Vec<Vec<u8>>, FramingError> {
    match framing {
        Framing::ShortDatagram => {
            if capacity == 0 {
                return Err(FramingError::CapacityTooSmall(capacity));
            }
            let mut datagrams: Vec<Vec<u8>> =
                image.chunks(capacity).map(<[u8]>::to_vec).collect();
            if image.len() % capacity == 0 {
                datagrams.push(Vec::new());
            }
            Ok(datagrams)
        }
        Framing::LengthPrefixed => {
            if capacity <= LENGTH_PREFIX_HEADER_LEN {
                return Err(FramingError::CapacityTooSmall(capacity));
            }
            let total =
                u32::try_from(image.len()).map_err(|_| FramingError::TooLong(image.len()))?;

            let first_len = image.len().min(capacity - LENGTH_PREFIX_HEADER_LEN);
            let (head, rest) = image.split_at(first_len);

            let mut first = Vec::with_capacity(LENGTH_PREFIX_HEADER_LEN + first_len);
            first.extend_from_slice(&LENGTH_PREFIX_MAGIC);
            first.extend_from_slice(&total.to_be_bytes());
            first.extend_from_slice(head);

            let mut datagrams = vec![first];
            datagrams.extend(rest.chunks(capacity).map(<[u8]>::to_vec));
            Ok(datagrams)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(
        delimiter: &mut Delimiter,
        datagrams: &[Vec<u8>],
    ) -> Result<(Vec<u8>, Progress), FramingError> {
        let mut out = Vec::new();
        let mut last = Progress::More;
        for d in datagrams {
            let (payload, progress) = delimiter.accept(d)?;
            out.extend_from_slice(payload);
            last = progress;
        }
        Ok((out, last))
    }

    #[test]
    fn short_datagram_completes_below_capacity() {
        let mut d = Delimiter::new(Framing::ShortDatagram, 4);
        assert_eq!(d.accept(b"abcd").unwrap(), (&b"abcd"[..], Progress::More));
        assert_eq!(d.accept(b"ef").unwrap(), (&b"ef"[..], Progress::Complete));
    }

    #[test]
    fn short_datagram_exact_capacity_is_not_final() {
        let mut d = Delimiter::new(Framing::ShortDatagram, 4);
        assert_eq!(d.accept(b"wxyz").unwrap().1, Progress::More);
    }

    #[test]
    fn empty_datagram_terminates_short_framing() {
        let mut d = Delimiter::new(Framing::ShortDatagram, 4);
        assert_eq!(d.accept(b"").unwrap(), (&b""[..], Progress::Complete));
    }

    #[test]
    fn split_short_appends_terminator_on_exact_multiple() {
        let image = [9u8; 8];
        let datagrams = split(&image, 4, Framing::ShortDatagram).unwrap();
        let lens: Vec<_> = datagrams.iter().map(Vec::len).collect();
        assert_eq!(lens, [4, 4, 0]);

        let datagrams = split(&image[..7], 4, Framing::ShortDatagram).unwrap();
        let lens: Vec<_> = datagrams.iter().map(Vec::len).collect();
        assert_eq!(lens, [4, 3]);
    }

    #[test]
    fn split_short_empty_image_is_one_terminator() {
        let datagrams = split(&[], 4, Framing::ShortDatagram).unwrap();
        assert_eq!(datagrams, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn length_prefixed_completes_on_declared_total() {
        let image: Vec<u8> = (0u8..20).collect();
        let datagrams = split(&image, 10, Framing::LengthPrefixed).unwrap();
        let lens: Vec<_> = datagrams.iter().map(Vec::len).collect();
        // 2 payload bytes ride with the header, then full-capacity chunks.
        assert_eq!(lens, [10, 10, 8]);

        let mut d = Delimiter::new(Framing::LengthPrefixed, 10);
        let (bytes, progress) = feed(&mut d, &datagrams).unwrap();
        assert_eq!(progress, Progress::Complete);
        assert_eq!(bytes, image);
    }

    #[test]
    fn length_prefixed_exact_capacity_final_fragment_completes() {
        // 2 + 10 + 10 bytes: the last datagram is exactly capacity.
        let image = vec![5u8; 22];
        let datagrams = split(&image, 10, Framing::LengthPrefixed).unwrap();
        assert_eq!(datagrams.last().map(Vec::len), Some(10));

        let mut d = Delimiter::new(Framing::LengthPrefixed, 10);
        let (bytes, progress) = feed(&mut d, &datagrams).unwrap();
        assert_eq!(progress, Progress::Complete);
        assert_eq!(bytes.len(), 22);
    }

    #[test]
    fn length_prefixed_empty_image_is_header_only() {
        let datagrams = split(&[], 16, Framing::LengthPrefixed).unwrap();
        assert_eq!(datagrams, vec![b"CVLP\0\0\0\0".to_vec()]);

        let mut d = Delimiter::new(Framing::LengthPrefixed, 16);
        assert_eq!(
            feed(&mut d, &datagrams).unwrap(),
            (Vec::new(), Progress::Complete)
        );
    }

    #[test]
    fn length_prefixed_rejects_bad_header() {
        let mut d = Delimiter::new(Framing::LengthPrefixed, 16);
        assert_eq!(d.accept(b"CVL").unwrap_err(), FramingError::MissingHeader(3));

        let mut d = Delimiter::new(Framing::LengthPrefixed, 16);
        assert_eq!(
            d.accept(b"JUNK\0\0\0\x01x").unwrap_err(),
            FramingError::BadMagic(*b"JUNK")
        );
    }

    #[test]
    fn length_prefixed_rejects_overrun() {
        let mut d = Delimiter::new(Framing::LengthPrefixed, 16);
        assert_eq!(d.accept(b"CVLP\0\0\0\x03ab").unwrap().1, Progress::More);
        assert_eq!(
            d.accept(b"cd").unwrap_err(),
            FramingError::Overrun {
                declared: 3,
                received: 4
            }
        );
    }

    #[test]
    fn split_length_prefixed_needs_room_for_payload() {
        assert_eq!(
            split(b"x", LENGTH_PREFIX_HEADER_LEN, Framing::LengthPrefixed).unwrap_err(),
            FramingError::CapacityTooSmall(LENGTH_PREFIX_HEADER_LEN)
        );
    }

    #[test]
    fn framing_names_parse() {
        assert_eq!("short".parse::<Framing>().unwrap(), Framing::ShortDatagram);
        assert_eq!(
            "length-prefixed".parse::<Framing>().unwrap(),
            Framing::LengthPrefixed
        );
        assert!(matches!(
            "bogus".parse::<Framing>(),
            Err(FramingError::UnknownMode(_))
        ));
        assert_eq!(Framing::LengthPrefixed.to_string(), "length");
    }
}
