//! Binary codec for [`ModelNode`] trees.
//!
//! One type byte per node followed by a type-specific payload; strings use
//! the Java `writeUTF` layout (u16 byte length + modified UTF-8), with a
//! secondary `S` form for strings whose encoding exceeds the u16 limit. The
//! HTTP bodies exchanged with the management endpoint carry the base64 text
//! of this encoding.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::model::{ModelNode, ModelType};

/// Raised when a tree has no wire representation: the `writeUTF` length
/// prefix is a u16, and only plain strings have a long form. Keys,
/// expressions and big decimals past that limit cannot be carried.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("text of {len} modified UTF-8 bytes does not fit the u16 length prefix")]
    TextTooLong { len: usize },
}

/// Raised on malformed binary or base64 input.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("unknown type tag 0x{tag:02x} at offset {offset}")]
    UnknownType { tag: u8, offset: usize },
    #[error("malformed string data at offset {offset}")]
    InvalidString { offset: usize },
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

// Threshold above which strings switch to the `S` long form, in modified
// UTF-8 bytes (the writeUTF length prefix is a u16).
const LONG_STRING_THRESHOLD: usize = 65535;

/// Encodes a tree into its binary form. Undefined and partial trees encode
/// without error; the only failure is text the wire format cannot carry.
pub fn encode(node: &ModelNode) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    write_node(&mut out, node)?;
    Ok(out)
}

/// Decodes one tree from its binary form; trailing bytes are ignored.
pub fn decode(bytes: &[u8]) -> Result<ModelNode, DecodeError> {
    let mut reader = Reader { buf: bytes, pos: 0 };
    reader.read_node()
}

/// The base64 text form used as HTTP payload.
pub fn to_base64(node: &ModelNode) -> Result<String, EncodeError> {
    Ok(BASE64_STANDARD.encode(encode(node)?))
}

/// Decodes a tree from its base64 text form. Whitespace is tolerated since
/// servers may wrap the payload.
pub fn from_base64(text: &str) -> Result<ModelNode, DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64_STANDARD.decode(compact.as_bytes())?;
    decode(&bytes)
}

// ------------------------------------------------------ encoding

fn write_node(out: &mut Vec<u8>, node: &ModelNode) -> Result<(), EncodeError> {
    match node {
        ModelNode::Undefined => out.push(ModelType::Undefined.type_char()),
        ModelNode::Boolean(b) => {
            out.push(ModelType::Boolean.type_char());
            out.push(u8::from(*b));
        }
        ModelNode::Int(i) => {
            out.push(ModelType::Int.type_char());
            out.extend_from_slice(&i.to_be_bytes());
        }
        ModelNode::Long(l) => {
            out.push(ModelType::Long.type_char());
            out.extend_from_slice(&l.to_be_bytes());
        }
        ModelNode::BigInteger(bytes) => {
            out.push(ModelType::BigInteger.type_char());
            out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        ModelNode::Double(d) => {
            out.push(ModelType::Double.type_char());
            out.extend_from_slice(&d.to_be_bytes());
        }
        ModelNode::BigDecimal(s) => {
            out.push(ModelType::BigDecimal.type_char());
            write_utf(out, s)?;
        }
        ModelNode::String(s) => write_string(out, s),
        ModelNode::Bytes(bytes) => {
            out.push(ModelType::Bytes.type_char());
            out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        ModelNode::Expression(s) => {
            out.push(ModelType::Expression.type_char());
            write_utf(out, s)?;
        }
        ModelNode::List(items) => {
            out.push(ModelType::List.type_char());
            out.extend_from_slice(&(items.len() as i32).to_be_bytes());
            for item in items {
                write_node(out, item)?;
            }
        }
        ModelNode::Object(entries) => {
            out.push(ModelType::Object.type_char());
            out.extend_from_slice(&(entries.len() as i32).to_be_bytes());
            for (key, value) in entries {
                write_utf(out, key)?;
                write_node(out, value)?;
            }
        }
        ModelNode::Property(name, value) => {
            out.push(ModelType::Property.type_char());
            write_utf(out, name)?;
            write_node(out, value)?;
        }
        ModelNode::Type(t) => {
            out.push(ModelType::Type.type_char());
            out.push(t.type_char());
        }
    }
    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    let encoded = modified_utf8(s);
    if encoded.len() > LONG_STRING_THRESHOLD {
        // Long form: UTF-16 unit count, then each unit in 1-3 bytes.
        out.push(b'S');
        let units: Vec<u16> = s.encode_utf16().collect();
        out.extend_from_slice(&(units.len() as i32).to_be_bytes());
        for unit in units {
            write_unit(out, unit);
        }
    } else {
        out.push(ModelType::String.type_char());
        out.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
        out.extend_from_slice(&encoded);
    }
}

// Java DataOutput.writeUTF: u16 byte-length prefix + modified UTF-8.
// Oversized text is an error, never a wrapped length prefix.
fn write_utf(out: &mut Vec<u8>, s: &str) -> Result<(), EncodeError> {
    let encoded = modified_utf8(s);
    let len = u16::try_from(encoded.len())
        .map_err(|_| EncodeError::TextTooLong { len: encoded.len() })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&encoded);
    Ok(())
}

// Modified UTF-8: NUL as 0xC0 0x80, supplementary characters as surrogate
// pairs with each UTF-16 unit in 3 bytes.
fn modified_utf8(s: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        write_unit(&mut encoded, unit);
    }
    encoded
}

fn write_unit(out: &mut Vec<u8>, unit: u16) {
    if unit > 0 && unit <= 0x7f {
        out.push(unit as u8);
    } else if unit <= 0x7ff {
        out.push(0xc0 | (unit >> 6) as u8);
        out.push(0x80 | (unit & 0x3f) as u8);
    } else {
        out.push(0xe0 | (unit >> 12) as u8);
        out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
        out.push(0x80 | (unit & 0x3f) as u8);
    }
}

// ------------------------------------------------------ decoding

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn eof(&self) -> DecodeError {
        DecodeError::UnexpectedEof { offset: self.pos }
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.buf.get(self.pos).ok_or_else(|| self.eof())?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or_else(|| self.eof())?;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| self.eof())?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn len(&mut self) -> Result<usize, DecodeError> {
        let value = self.i32()?;
        usize::try_from(value).map_err(|_| DecodeError::InvalidString { offset: self.pos })
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        let bytes = self.take(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(array))
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.i64()? as u64))
    }

    fn read_utf(&mut self) -> Result<String, DecodeError> {
        let byte_len = self.u16()? as usize;
        let start = self.pos;
        let bytes = self.take(byte_len)?;
        let mut units = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let (unit, consumed) = decode_unit(bytes, i).ok_or(DecodeError::InvalidString {
                offset: start + i,
            })?;
            units.push(unit);
            i += consumed;
        }
        String::from_utf16(&units).map_err(|_| DecodeError::InvalidString { offset: start })
    }

    fn read_long_string(&mut self) -> Result<String, DecodeError> {
        let unit_count = self.len()?;
        let mut units = Vec::with_capacity(unit_count.min(1 << 20));
        for _ in 0..unit_count {
            let start = self.pos;
            let (unit, consumed) = decode_unit(self.buf, start)
                .ok_or(DecodeError::InvalidString { offset: start })?;
            self.pos += consumed;
            units.push(unit);
        }
        String::from_utf16(&units).map_err(|_| DecodeError::InvalidString { offset: self.pos })
    }

    fn read_node(&mut self) -> Result<ModelNode, DecodeError> {
        let offset = self.pos;
        let tag = self.u8()?;
        if tag == b'S' {
            return self.read_long_string().map(ModelNode::String);
        }
        let node_type = ModelType::from_type_char(tag)
            .ok_or(DecodeError::UnknownType { tag, offset })?;
        match node_type {
            ModelType::Undefined => Ok(ModelNode::Undefined),
            ModelType::Boolean => Ok(ModelNode::Boolean(self.u8()? != 0)),
            ModelType::Int => Ok(ModelNode::Int(self.i32()?)),
            ModelType::Long => Ok(ModelNode::Long(self.i64()?)),
            ModelType::BigInteger => {
                let len = self.len()?;
                Ok(ModelNode::BigInteger(self.take(len)?.to_vec()))
            }
            ModelType::Double => Ok(ModelNode::Double(self.f64()?)),
            ModelType::BigDecimal => Ok(ModelNode::BigDecimal(self.read_utf()?)),
            ModelType::String => Ok(ModelNode::String(self.read_utf()?)),
            ModelType::Bytes => {
                let len = self.len()?;
                Ok(ModelNode::Bytes(self.take(len)?.to_vec()))
            }
            ModelType::Expression => Ok(ModelNode::Expression(self.read_utf()?)),
            ModelType::List => {
                let count = self.len()?;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.read_node()?);
                }
                Ok(ModelNode::List(items))
            }
            ModelType::Object => {
                let count = self.len()?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let key = self.read_utf()?;
                    entries.push((key, self.read_node()?));
                }
                Ok(ModelNode::Object(entries))
            }
            ModelType::Property => {
                let name = self.read_utf()?;
                Ok(ModelNode::Property(name, Box::new(self.read_node()?)))
            }
            ModelType::Type => {
                let offset = self.pos;
                let tag = self.u8()?;
                let inner = ModelType::from_type_char(tag)
                    .ok_or(DecodeError::UnknownType { tag, offset })?;
                Ok(ModelNode::Type(inner))
            }
        }
    }
}

// One modified-UTF-8 unit starting at `from`; returns the UTF-16 unit and
// the number of bytes consumed.
fn decode_unit(bytes: &[u8], from: usize) -> Option<(u16, usize)> {
    let a = *bytes.get(from)? as u16;
    if a < 0x80 {
        Some((a, 1))
    } else if a < 0xc0 {
        None
    } else if a < 0xe0 {
        let b = *bytes.get(from + 1)? as u16;
        if b & 0xc0 != 0x80 {
            return None;
        }
        Some(((a & 0x1f) << 6 | b & 0x3f, 2))
    } else if a < 0xf0 {
        let b = *bytes.get(from + 1)? as u16;
        let c = *bytes.get(from + 2)? as u16;
        if b & 0xc0 != 0x80 || c & 0xc0 != 0x80 {
            return None;
        }
        Some(((a & 0x0f) << 12 | (b & 0x3f) << 6 | c & 0x3f, 3))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::keys;

    fn round_trip(node: &ModelNode) -> ModelNode {
        let bytes = encode(node).expect("encode of representable node");
        decode(&bytes).expect("decode of freshly encoded node")
    }

    #[test]
    fn scalars_round_trip() {
        for node in [
            ModelNode::Undefined,
            ModelNode::Boolean(true),
            ModelNode::Boolean(false),
            ModelNode::Int(-42),
            ModelNode::Long(i64::MAX),
            ModelNode::Double(1.25),
            ModelNode::BigDecimal("3.14159265358979323846".into()),
            ModelNode::BigInteger(vec![0x01, 0xff, 0x00]),
            ModelNode::String("server-one".into()),
            ModelNode::Bytes(vec![0, 1, 2, 254, 255]),
            ModelNode::Expression("${jboss.bind.address:127.0.0.1}".into()),
            ModelNode::Type(ModelType::List),
        ] {
            assert_eq!(round_trip(&node), node, "round trip of {node}");
        }
    }

    #[test]
    fn nested_tree_round_trips_in_order() {
        let mut envelope = ModelNode::object();
        envelope.insert(keys::OUTCOME, keys::SUCCESS);
        let result = envelope.get_mut(keys::RESULT);
        result.insert("enabled", true);
        result.insert("max-pool-size", 20);
        let mut connections = ModelNode::list();
        connections.push("one");
        connections.push("two");
        result.insert("connections", connections);
        envelope.insert(
            "prop",
            ModelNode::Property("driver".into(), Box::new(ModelNode::from("h2"))),
        );

        assert_eq!(round_trip(&envelope), envelope);
    }

    #[test]
    fn modified_utf8_edges_round_trip() {
        for text in ["", "nul\0middle", "umlaut \u{00e4}", "cjk \u{4e2d}", "clef \u{1d11e}"] {
            let node = ModelNode::from(text);
            assert_eq!(round_trip(&node), node, "round trip of {text:?}");
        }
    }

    #[test]
    fn nul_uses_two_byte_form() {
        let bytes = encode(&ModelNode::from("\0")).unwrap();
        // tag, u16 length 2, 0xC0 0x80
        assert_eq!(bytes, vec![b's', 0, 2, 0xc0, 0x80]);
    }

    #[test]
    fn long_string_switches_to_s_form() {
        let text = "x".repeat(70_000);
        let node = ModelNode::from(text.as_str());
        let bytes = encode(&node).unwrap();
        assert_eq!(bytes[0], b'S');
        assert_eq!(round_trip(&node), node);
    }

    #[test]
    fn overlong_expression_is_an_encode_error() {
        // Only plain strings have the long form; expressions past the u16
        // limit must error instead of emitting a wrapped length prefix.
        let node = ModelNode::Expression("x".repeat(70_000));
        let err = encode(&node).unwrap_err();
        assert!(matches!(err, EncodeError::TextTooLong { len: 70_000 }));
    }

    #[test]
    fn overlong_object_key_is_an_encode_error() {
        let mut node = ModelNode::object();
        node.insert(&"k".repeat(70_000), 1);
        assert!(encode(&node).is_err());

        let decimal = ModelNode::BigDecimal("9".repeat(70_000));
        assert!(encode(&decimal).is_err());
        let property = ModelNode::Property("p".repeat(70_000), Box::new(ModelNode::Int(1)));
        assert!(encode(&property).is_err());
    }

    #[test]
    fn base64_round_trips() {
        let mut node = ModelNode::object();
        node.insert(keys::OP, "read-resource");
        let text = to_base64(&node).unwrap();
        assert_eq!(from_base64(&text).unwrap(), node);
        // servers may insert line breaks into long payloads
        let wrapped = format!("{}\n{}", &text[..4], &text[4..]);
        assert_eq!(from_base64(&wrapped).unwrap(), node);
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        let bytes = encode(&ModelNode::from("truncate me")).unwrap();
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn unknown_tag_is_a_decode_error() {
        let err = decode(&[b'q']).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownType { tag: b'q', .. }));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = encode(&ModelNode::Int(7)).unwrap();
        bytes.extend_from_slice(b"junk");
        assert_eq!(decode(&bytes).unwrap(), ModelNode::Int(7));
    }
}
