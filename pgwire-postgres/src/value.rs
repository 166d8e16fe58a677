//! Scalar decoding for the handful of built-in types most callers reach for
//! first. Per spec.md §1, per-OID binary/text codec *tables* are out of
//! scope; this module gives a working `Decode`/`Encode` pair for the common
//! scalars so `fetch`/`fetchval` are usable without a full codec catalogue.

use bytes::Bytes;

use crate::error::Error;
use crate::message::FormatCode;
use crate::Result;

/// Oids this module knows how to decode in binary format. Anything else
/// round-trips through its text representation.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const VARCHAR: u32 = 1043;
    pub const BYTEA: u32 = 17;
}

/// A single not-NULL column value as it arrived on the wire.
#[derive(Debug, Clone, Copy)]
pub struct PgValueRef<'a> {
    pub oid: u32,
    pub format: FormatCode,
    pub bytes: &'a [u8],
}

/// Implemented for Rust types the driver can decode out of the box.
///
/// `decode_nullable` receives `None` for SQL `NULL`; the default rejects it,
/// which is what every non-`Option` impl below wants. `Option<T>` overrides
/// it to return `Ok(None)` instead.
pub trait Decode<'a>: Sized {
    fn decode(value: PgValueRef<'a>) -> Result<Self>;

    fn decode_nullable(value: Option<PgValueRef<'a>>) -> Result<Self> {
        match value {
            Some(value) => Self::decode(value),
            None => Err(Error::Decode("unexpected NULL".to_owned())),
        }
    }
}

/// Implemented for Rust types the driver can bind as a query parameter.
pub trait Encode {
    /// Preferred wire format for this type.
    fn format() -> FormatCode {
        FormatCode::Text
    }

    fn encode(&self, buf: &mut Vec<u8>);
}

fn decode_err(oid: u32, target: &str) -> Error {
    Error::Decode(format!("cannot decode oid {oid} as {target}"))
}

impl<'a> Decode<'a> for bool {
    fn decode(value: PgValueRef<'a>) -> Result<Self> {
        match value.format {
            FormatCode::Binary => value
                .bytes
                .first()
                .map(|b| *b != 0)
                .ok_or_else(|| decode_err(value.oid, "bool")),
            FormatCode::Text => match value.bytes {
                b"t" => Ok(true),
                b"f" => Ok(false),
                _ => Err(decode_err(value.oid, "bool")),
            },
        }
    }
}

impl Encode for bool {
    fn format() -> FormatCode {
        FormatCode::Binary
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(if *self { 1 } else { 0 });
    }
}

macro_rules! int_codec {
    ($ty:ty, $size:expr) => {
        impl<'a> Decode<'a> for $ty {
            fn decode(value: PgValueRef<'a>) -> Result<Self> {
                match value.format {
                    FormatCode::Binary => {
                        let bytes: [u8; $size] = value
                            .bytes
                            .try_into()
                            .map_err(|_| decode_err(value.oid, stringify!($ty)))?;
                        Ok(<$ty>::from_be_bytes(bytes))
                    }
                    FormatCode::Text => std::str::from_utf8(value.bytes)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| decode_err(value.oid, stringify!($ty))),
                }
            }
        }

        impl Encode for $ty {
            fn format() -> FormatCode {
                FormatCode::Binary
            }

            fn encode(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_be_bytes());
            }
        }
    };
}

int_codec!(i16, 2);
int_codec!(i32, 4);
int_codec!(i64, 8);
int_codec!(f32, 4);
int_codec!(f64, 8);

impl<'a> Decode<'a> for String {
    fn decode(value: PgValueRef<'a>) -> Result<Self> {
        String::from_utf8(value.bytes.to_vec())
            .map_err(|_| decode_err(value.oid, "String"))
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl Encode for &str {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl<'a> Decode<'a> for Vec<u8> {
    fn decode(value: PgValueRef<'a>) -> Result<Self> {
        match value.format {
            FormatCode::Binary => Ok(value.bytes.to_vec()),
            FormatCode::Text => {
                let text = std::str::from_utf8(value.bytes)
                    .map_err(|_| decode_err(value.oid, "bytea"))?;
                let hex = text
                    .strip_prefix("\\x")
                    .ok_or_else(|| decode_err(value.oid, "bytea"))?;
                hex::decode(hex).map_err(|_| decode_err(value.oid, "bytea"))
            }
        }
    }
}

impl Encode for Vec<u8> {
    fn format() -> FormatCode {
        FormatCode::Binary
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}

impl<'a, T: Decode<'a>> Decode<'a> for Option<T> {
    fn decode(value: PgValueRef<'a>) -> Result<Self> {
        T::decode(value).map(Some)
    }

    fn decode_nullable(value: Option<PgValueRef<'a>>) -> Result<Self> {
        match value {
            Some(value) => T::decode(value).map(Some),
            None => Ok(None),
        }
    }
}

/// Renders `bytes` (already confirmed not-NULL) into an owned `Bytes` for
/// call sites that need to keep it past the row's lifetime.
pub fn to_owned_bytes(value: PgValueRef<'_>) -> Bytes {
    Bytes::copy_from_slice(value.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(oid: u32, format: FormatCode, bytes: &'a [u8]) -> PgValueRef<'a> {
        PgValueRef { oid, format, bytes }
    }

    #[test]
    fn bool_round_trips_in_binary_and_text() {
        assert!(bool::decode(value(oid::BOOL, FormatCode::Binary, &[1])).unwrap());
        assert!(!bool::decode(value(oid::BOOL, FormatCode::Binary, &[0])).unwrap());
        assert!(bool::decode(value(oid::BOOL, FormatCode::Text, b"t")).unwrap());
        assert!(!bool::decode(value(oid::BOOL, FormatCode::Text, b"f")).unwrap());
        assert!(bool::decode(value(oid::BOOL, FormatCode::Text, b"x")).is_err());

        let mut buf = Vec::new();
        true.encode(&mut buf);
        assert_eq!(buf, vec![1]);
    }

    #[test]
    fn i32_round_trips_in_binary_and_text() {
        let mut buf = Vec::new();
        42i32.encode(&mut buf);
        assert_eq!(buf, 42i32.to_be_bytes().to_vec());
        assert_eq!(i32::decode(value(oid::INT4, FormatCode::Binary, &buf)).unwrap(), 42);
        assert_eq!(i32::decode(value(oid::INT4, FormatCode::Text, b"42")).unwrap(), 42);
        assert!(i32::decode(value(oid::INT4, FormatCode::Text, b"not a number")).is_err());
    }

    #[test]
    fn i64_and_f64_decode_binary() {
        let mut buf = Vec::new();
        9_000_000_000i64.encode(&mut buf);
        assert_eq!(i64::decode(value(oid::INT8, FormatCode::Binary, &buf)).unwrap(), 9_000_000_000);

        let mut buf = Vec::new();
        3.5f64.encode(&mut buf);
        assert_eq!(f64::decode(value(oid::FLOAT8, FormatCode::Binary, &buf)).unwrap(), 3.5);
    }

    #[test]
    fn string_decodes_utf8_text() {
        assert_eq!(
            String::decode(value(oid::TEXT, FormatCode::Text, "héllo".as_bytes())).unwrap(),
            "héllo"
        );
        assert!(String::decode(value(oid::TEXT, FormatCode::Text, &[0xff, 0xfe])).is_err());
    }

    #[test]
    fn bytea_decodes_hex_text_and_raw_binary() {
        let bytes = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(
            Vec::<u8>::decode(value(oid::BYTEA, FormatCode::Text, b"\\xdeadbeef")).unwrap(),
            bytes
        );
        assert_eq!(Vec::<u8>::decode(value(oid::BYTEA, FormatCode::Binary, &bytes)).unwrap(), bytes);
        assert!(Vec::<u8>::decode(value(oid::BYTEA, FormatCode::Text, b"not hex")).is_err());
    }

    #[test]
    fn option_decode_nullable_handles_null_and_present() {
        assert_eq!(Option::<i32>::decode_nullable(None).unwrap(), None);
        let mut buf = Vec::new();
        7i32.encode(&mut buf);
        let present = Some(value(oid::INT4, FormatCode::Binary, &buf));
        assert_eq!(Option::<i32>::decode_nullable(present).unwrap(), Some(7));
    }

    #[test]
    fn non_optional_decode_nullable_rejects_null() {
        assert!(i32::decode_nullable(None).is_err());
    }
}
