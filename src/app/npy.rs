//! NumPy `.npy` codec for patch payloads
//!
//! The pixel endpoint serializes a patch as a structured array of shape
//! `(rows, cols)` with one field per band, each field a scalar of the band's
//! own type. `ndarray-npy` only reads plain arrays, so structured records are
//! decoded here field by field. Plain numeric arrays of shape `(rows, cols)` or
//! `(rows, cols, bands)` go through `ndarray-npy`. Either way the result is a
//! [`Patch`] of `f64` values.
//!
//! Patches are written to disk with [`ndarray_npy::WriteNpyExt`].

use ndarray::{Array3, ArrayD};
use ndarray_npy::{ReadNpyExt, ReadableElement};

use crate::app::models::Patch;
use crate::errors::{NpyError, NpyResult};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Element kind of a scalar dtype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
}

/// A scalar dtype such as `<u2` or `>f8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalarType {
    kind: ScalarKind,
    size: usize,
    big_endian: bool,
}

impl ScalarType {
    fn parse(descr: &str) -> NpyResult<Self> {
        let unsupported = || NpyError::UnsupportedDtype {
            descr: descr.to_string(),
        };

        let mut chars = descr.chars();
        let order = chars.next().ok_or_else(unsupported)?;
        let big_endian = match order {
            '<' | '|' => false,
            '>' => true,
            '=' => cfg!(target_endian = "big"),
            _ => return Err(unsupported()),
        };
        let kind = match chars.next().ok_or_else(unsupported)? {
            'b' => ScalarKind::Bool,
            'i' => ScalarKind::Int,
            'u' => ScalarKind::UInt,
            'f' => ScalarKind::Float,
            _ => return Err(unsupported()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;

        let valid = match kind {
            ScalarKind::Bool => size == 1,
            ScalarKind::Int | ScalarKind::UInt => matches!(size, 1 | 2 | 4 | 8),
            ScalarKind::Float => matches!(size, 4 | 8),
        };
        if !valid {
            return Err(unsupported());
        }

        Ok(Self {
            kind,
            size,
            big_endian,
        })
    }

    /// Reads one value; `bytes` holds exactly `self.size` bytes
    fn read(&self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..self.size].copy_from_slice(bytes);
        if self.big_endian {
            buf[..self.size].reverse();
        }
        match (self.kind, self.size) {
            (ScalarKind::Bool, _) => f64::from(u8::from(buf[0] != 0)),
            (ScalarKind::UInt, 1) => f64::from(buf[0]),
            (ScalarKind::Int, 1) => f64::from(buf[0] as i8),
            (ScalarKind::UInt, 2) => f64::from(u16::from_le_bytes([buf[0], buf[1]])),
            (ScalarKind::Int, 2) => f64::from(i16::from_le_bytes([buf[0], buf[1]])),
            (ScalarKind::UInt, 4) => {
                f64::from(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
            }
            (ScalarKind::Int, 4) => {
                f64::from(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
            }
            (ScalarKind::Float, 4) => {
                f64::from(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
            }
            (ScalarKind::UInt, _) => u64::from_le_bytes(buf) as f64,
            (ScalarKind::Int, _) => i64::from_le_bytes(buf) as f64,
            (ScalarKind::Float, _) => f64::from_le_bytes(buf),
        }
    }
}

/// Parsed array layout
#[derive(Debug, Clone, PartialEq)]
enum Dtype {
    Plain(ScalarType),
    Structured(Vec<(String, ScalarType)>),
}

impl Dtype {
    fn item_size(&self) -> usize {
        match self {
            Dtype::Plain(scalar) => scalar.size,
            Dtype::Structured(fields) => fields.iter().map(|(_, scalar)| scalar.size).sum(),
        }
    }
}

/// Parsed `.npy` header
#[derive(Debug, Clone, PartialEq)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Decodes an `.npy` payload into a patch
///
/// # Errors
///
/// Returns `NpyError` if the payload is malformed, uses an unsupported dtype or
/// ordering, or has a shape that cannot be read as `(rows, cols, bands)`
pub fn decode_patch(bytes: &[u8]) -> NpyResult<Patch> {
    let (header, data) = split_header(bytes)?;
    if header.fortran_order {
        return Err(NpyError::FortranOrder);
    }

    let element_count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| invalid_header("shape has more elements than fit in memory"))?;
    let item_size = header.dtype.item_size();
    let expected = element_count
        .checked_mul(item_size)
        .ok_or_else(|| invalid_header("data size overflows"))?;
    if data.len() < expected {
        return Err(NpyError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    let header_end = bytes.len() - data.len();
    let data = &data[..expected];

    match &header.dtype {
        Dtype::Structured(fields) => {
            let (rows, cols) = match header.shape.as_slice() {
                [rows, cols] => (*rows, *cols),
                other => return Err(shape_mismatch("(rows, cols) for a structured array", other)),
            };
            let mut values = Vec::with_capacity(element_count * fields.len());
            for record in data.chunks_exact(item_size) {
                let mut offset = 0;
                for (_, scalar) in fields {
                    values.push(scalar.read(&record[offset..offset + scalar.size]));
                    offset += scalar.size;
                }
            }
            let pixels = Array3::from_shape_vec((rows, cols, fields.len()), values)
                .map_err(|_| shape_mismatch("(rows, cols, fields)", &header.shape))?;
            let bands = fields.iter().map(|(name, _)| name.clone()).collect();
            Ok(Patch::new(bands, pixels))
        }
        Dtype::Plain(scalar) => {
            let (rows, cols, band_count) = match header.shape.as_slice() {
                [rows, cols] => (*rows, *cols, 1),
                [rows, cols, bands] => (*rows, *cols, *bands),
                other => return Err(shape_mismatch("(rows, cols) or (rows, cols, bands)", other)),
            };
            let values = read_plain(&bytes[..header_end + expected], scalar)?;
            let pixels = values
                .into_shape((rows, cols, band_count))
                .map_err(|_| shape_mismatch("(rows, cols, bands)", &header.shape))?;
            let bands = (1..=band_count).map(|i| format!("band_{}", i)).collect();
            Ok(Patch::new(bands, pixels))
        }
    }
}

/// Reads a plain array with `ndarray-npy`, widening every element to `f64`
fn read_plain(payload: &[u8], scalar: &ScalarType) -> NpyResult<ArrayD<f64>> {
    match (scalar.kind, scalar.size) {
        (ScalarKind::Bool, _) => read_as::<bool>(payload, |v| f64::from(u8::from(*v))),
        (ScalarKind::UInt, 1) => read_as::<u8>(payload, |v| f64::from(*v)),
        (ScalarKind::Int, 1) => read_as::<i8>(payload, |v| f64::from(*v)),
        (ScalarKind::UInt, 2) => read_as::<u16>(payload, |v| f64::from(*v)),
        (ScalarKind::Int, 2) => read_as::<i16>(payload, |v| f64::from(*v)),
        (ScalarKind::UInt, 4) => read_as::<u32>(payload, |v| f64::from(*v)),
        (ScalarKind::Int, 4) => read_as::<i32>(payload, |v| f64::from(*v)),
        (ScalarKind::Float, 4) => read_as::<f32>(payload, |v| f64::from(*v)),
        (ScalarKind::UInt, _) => read_as::<u64>(payload, |v| *v as f64),
        (ScalarKind::Int, _) => read_as::<i64>(payload, |v| *v as f64),
        (ScalarKind::Float, _) => read_as::<f64>(payload, |v| *v),
    }
}

fn read_as<T: ReadableElement>(payload: &[u8], widen: fn(&T) -> f64) -> NpyResult<ArrayD<f64>> {
    let array = ArrayD::<T>::read_npy(payload)?;
    Ok(array.map(widen))
}

fn shape_mismatch(expected: &str, actual: &[usize]) -> NpyError {
    NpyError::ShapeMismatch {
        expected: expected.to_string(),
        actual: actual.to_vec(),
    }
}

fn split_header(bytes: &[u8]) -> NpyResult<(Header, &[u8])> {
    if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(NpyError::BadMagic);
    }
    let major = bytes[6];
    let minor = bytes[7];
    let (header_len, header_start) = match major {
        1 => {
            let len = read_prefix(bytes, 8, 2)?;
            (u16::from_le_bytes([len[0], len[1]]) as usize, 10)
        }
        2 | 3 => {
            let len = read_prefix(bytes, 8, 4)?;
            (
                u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize,
                12,
            )
        }
        _ => return Err(NpyError::UnsupportedVersion { major, minor }),
    };

    let header_end = header_start + header_len;
    let header_bytes = read_prefix(bytes, header_start, header_len)?;
    let text = std::str::from_utf8(header_bytes).map_err(|_| NpyError::InvalidHeader {
        reason: "header is not valid UTF-8".to_string(),
    })?;

    Ok((parse_header(text)?, &bytes[header_end..]))
}

fn read_prefix(bytes: &[u8], start: usize, len: usize) -> NpyResult<&[u8]> {
    bytes
        .get(start..start + len)
        .ok_or(NpyError::Truncated {
            expected: start + len,
            actual: bytes.len(),
        })
}

fn parse_header(text: &str) -> NpyResult<Header> {
    let literal = LiteralParser::new(text).parse_document()?;
    let Literal::Dict(entries) = literal else {
        return Err(invalid_header("header is not a dictionary"));
    };

    let mut descr = None;
    let mut fortran_order = None;
    let mut shape = None;
    for (key, value) in entries {
        match key.as_str() {
            "descr" => descr = Some(parse_dtype(&value)?),
            "fortran_order" => match value {
                Literal::Bool(flag) => fortran_order = Some(flag),
                _ => return Err(invalid_header("fortran_order is not a boolean")),
            },
            "shape" => shape = Some(parse_shape(&value)?),
            _ => {}
        }
    }

    Ok(Header {
        dtype: descr.ok_or_else(|| invalid_header("missing descr"))?,
        fortran_order: fortran_order.ok_or_else(|| invalid_header("missing fortran_order"))?,
        shape: shape.ok_or_else(|| invalid_header("missing shape"))?,
    })
}

fn parse_dtype(value: &Literal) -> NpyResult<Dtype> {
    match value {
        Literal::Str(descr) => Ok(Dtype::Plain(ScalarType::parse(descr)?)),
        Literal::List(fields) => {
            let mut parsed = Vec::with_capacity(fields.len());
            for field in fields {
                match field {
                    Literal::Tuple(parts) => match parts.as_slice() {
                        [Literal::Str(name), Literal::Str(descr)] => {
                            parsed.push((name.clone(), ScalarType::parse(descr)?));
                        }
                        _ => {
                            return Err(NpyError::UnsupportedDtype {
                                descr: format!("{:?}", field),
                            })
                        }
                    },
                    _ => return Err(invalid_header("structured field is not a tuple")),
                }
            }
            if parsed.is_empty() {
                return Err(invalid_header("structured dtype has no fields"));
            }
            Ok(Dtype::Structured(parsed))
        }
        other => Err(NpyError::UnsupportedDtype {
            descr: format!("{:?}", other),
        }),
    }
}

fn parse_shape(value: &Literal) -> NpyResult<Vec<usize>> {
    let Literal::Tuple(dims) = value else {
        return Err(invalid_header("shape is not a tuple"));
    };
    dims.iter()
        .map(|dim| match dim {
            Literal::Int(n) if *n >= 0 => Ok(*n as usize),
            _ => Err(invalid_header("shape entries must be non-negative integers")),
        })
        .collect()
}

fn invalid_header(reason: &str) -> NpyError {
    NpyError::InvalidHeader {
        reason: reason.to_string(),
    }
}

/// The subset of Python literals that appears in `.npy` headers
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Dict(Vec<(String, Literal)>),
}

struct LiteralParser<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text: text.as_bytes(),
            pos: 0,
        }
    }

    fn parse_document(mut self) -> NpyResult<Literal> {
        let literal = self.parse_value()?;
        self.skip_whitespace();
        if self.pos != self.text.len() {
            return Err(invalid_header("trailing characters after dictionary"));
        }
        Ok(literal)
    }

    fn skip_whitespace(&mut self) {
        while self
            .text
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.text.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> NpyResult<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(NpyError::InvalidHeader {
                reason: format!("expected '{}' at offset {}", byte as char, self.pos),
            })
        }
    }

    fn parse_value(&mut self) -> NpyResult<Literal> {
        match self.peek() {
            Some(b'{') => self.parse_dict(),
            Some(b'[') => Ok(Literal::List(self.parse_sequence(b'[', b']')?)),
            Some(b'(') => Ok(Literal::Tuple(self.parse_sequence(b'(', b')')?)),
            Some(b'\'') | Some(b'"') => Ok(Literal::Str(self.parse_string()?)),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.parse_int(),
            Some(b) if b.is_ascii_alphabetic() => self.parse_keyword(),
            _ => Err(NpyError::InvalidHeader {
                reason: format!("unexpected token at offset {}", self.pos),
            }),
        }
    }

    fn parse_dict(&mut self) -> NpyResult<Literal> {
        self.expect(b'{')?;
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Literal::Dict(entries));
            }
            let key = self.parse_string()?;
            self.expect(b':')?;
            let value = self.parse_value()?;
            entries.push((key, value));
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(invalid_header("expected ',' or '}' in dictionary")),
            }
        }
    }

    fn parse_sequence(&mut self, open: u8, close: u8) -> NpyResult<Vec<Literal>> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.parse_value()?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b) if b == close => {}
                _ => return Err(invalid_header("expected ',' or closing bracket")),
            }
        }
    }

    fn parse_string(&mut self) -> NpyResult<String> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(invalid_header("expected a quoted string")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(&b) = self.text.get(self.pos) {
            if b == quote {
                let value = std::str::from_utf8(&self.text[start..self.pos])
                    .map_err(|_| invalid_header("string is not valid UTF-8"))?
                    .to_string();
                self.pos += 1;
                return Ok(value);
            }
            self.pos += 1;
        }
        Err(invalid_header("unterminated string"))
    }

    fn parse_int(&mut self) -> NpyResult<Literal> {
        let start = self.pos;
        if self.text.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while self.text.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        // Python 2 era headers may carry a long suffix
        let digits = std::str::from_utf8(&self.text[start..self.pos])
            .map_err(|_| invalid_header("invalid integer"))?;
        if self.text.get(self.pos) == Some(&b'L') {
            self.pos += 1;
        }
        digits
            .parse()
            .map(Literal::Int)
            .map_err(|_| invalid_header("invalid integer"))
    }

    fn parse_keyword(&mut self) -> NpyResult<Literal> {
        let start = self.pos;
        while self
            .text
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_alphabetic())
        {
            self.pos += 1;
        }
        match &self.text[start..self.pos] {
            b"True" => Ok(Literal::Bool(true)),
            b"False" => Ok(Literal::Bool(false)),
            _ => Err(invalid_header("unknown keyword")),
        }
    }
}
