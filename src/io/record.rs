//! Self-describing binary records, one per saved entity.
//!
//! ```text
//! record:  [ marker (4) | name_len (u32) | name | body | blake3 (32) ]
//! body:    Parameter       -> tensor
//!          LookupParameter -> [ rows (u64) | tensor * rows ]
//! tensor:  [ ndim (u32) | dims (u64 * ndim) | count (u64) | values (f32 * count) ]
//! ```
//!
//! All integers and floats are little-endian. The checksum covers every byte of the record
//! that precedes it.

use std::fmt;
use std::io::{ErrorKind, Read, Write};

use blake3::Hasher;
use serde::Serialize;

use crate::{
    config::PackConfig,
    constants::{
        CHECKSUM_SIZE, LOOKUP_MAGIC, MAX_NAME_BYTES, MAX_RANK, MAX_TENSOR_ELEMENTS,
        PARAMETER_MAGIC,
    },
    error::{PackError, Result},
    model::{LookupParameter, Parameter, Shape, Tensor, checked_product},
};

const VALUE_SIZE: u64 = std::mem::size_of::<f32>() as u64;
// Values are streamed through a bounded buffer instead of one allocation per tensor.
const VALUE_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Parameter,
    LookupParameter,
}

impl RecordKind {
    fn magic(self) -> [u8; 4] {
        match self {
            Self::Parameter => PARAMETER_MAGIC,
            Self::LookupParameter => LOOKUP_MAGIC,
        }
    }

    fn from_magic(magic: [u8; 4]) -> Option<Self> {
        match magic {
            PARAMETER_MAGIC => Some(Self::Parameter),
            LOOKUP_MAGIC => Some(Self::LookupParameter),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter => f.write_str("parameter"),
            Self::LookupParameter => f.write_str("lookup_parameter"),
        }
    }
}

/// Borrowed view of an entity about to be encoded.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub kind: RecordKind,
    pub name: &'a str,
    pub tensors: &'a [Tensor],
}

impl<'a> From<&'a Parameter> for RecordView<'a> {
    fn from(param: &'a Parameter) -> Self {
        Self {
            kind: RecordKind::Parameter,
            name: param.name(),
            tensors: std::slice::from_ref(param.tensor()),
        }
    }
}

impl<'a> From<&'a LookupParameter> for RecordView<'a> {
    fn from(table: &'a LookupParameter) -> Self {
        Self {
            kind: RecordKind::LookupParameter,
            name: table.name(),
            tensors: table.rows(),
        }
    }
}

/// Decoded record. A parameter record always carries exactly one tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub name: String,
    pub tensors: Vec<Tensor>,
}

impl Record {
    #[must_use]
    pub fn summary(&self, offset: u64, length: u64) -> RecordSummary {
        RecordSummary {
            name: self.name.clone(),
            kind: self.kind,
            offset,
            length,
            shapes: self
                .tensors
                .iter()
                .map(|tensor| tensor.shape().dims().to_vec())
                .collect(),
            elements: self
                .tensors
                .iter()
                .map(|tensor| tensor.values().len() as u64)
                .sum(),
        }
    }

    #[must_use]
    pub fn into_parameter(mut self) -> Option<Parameter> {
        match self.kind {
            RecordKind::Parameter if self.tensors.len() == 1 => {
                self.tensors.pop().map(|tensor| Parameter::new(self.name, tensor))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn into_lookup(self) -> Option<LookupParameter> {
        match self.kind {
            RecordKind::LookupParameter => Some(LookupParameter::new(self.name, self.tensors)),
            RecordKind::Parameter => None,
        }
    }
}

/// Shape-level description of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub name: String,
    pub kind: RecordKind,
    pub offset: u64,
    pub length: u64,
    pub shapes: Vec<Vec<usize>>,
    pub elements: u64,
}

/// Encoder/decoder for data file records.
#[derive(Debug, Clone, Copy)]
pub struct RecordCodec {
    verify_checksums: bool,
    max_record_bytes: u64,
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::from_config(&PackConfig::default())
    }
}

impl RecordCodec {
    #[must_use]
    pub fn from_config(config: &PackConfig) -> Self {
        Self {
            verify_checksums: config.verify_checksums,
            max_record_bytes: config.max_record_bytes,
        }
    }

    /// Size of `record` once encoded. Fails for records the decoder would refuse, so nothing
    /// unreadable ever reaches the data file.
    pub fn encoded_len(&self, record: RecordView<'_>) -> Result<u64> {
        if record.kind == RecordKind::Parameter && record.tensors.len() != 1 {
            return Err(PackError::InvalidShape {
                reason: format!(
                    "parameter '{}' must hold exactly one tensor, got {}",
                    record.name,
                    record.tensors.len()
                )
                .into(),
            });
        }
        if record.name.len() > MAX_NAME_BYTES as usize {
            return Err(PackError::InvalidShape {
                reason: format!("entity name exceeds {MAX_NAME_BYTES} bytes").into(),
            });
        }

        let mut length = 4 + 4 + record.name.len() as u64 + CHECKSUM_SIZE as u64;
        if record.kind == RecordKind::LookupParameter {
            length += 8;
        }
        for tensor in record.tensors {
            let rank = tensor.shape().rank() as u64;
            let count = tensor.values().len() as u64;
            length = length.saturating_add(4 + 8 * rank + 8 + VALUE_SIZE * count);
        }
        if length > self.max_record_bytes {
            return Err(PackError::RecordTooLarge {
                name: record.name.to_string(),
                length,
                limit: self.max_record_bytes,
            });
        }
        Ok(length)
    }

    /// Writes one record at the writer's position and returns its encoded length. The record is
    /// checked in full before its first byte is written.
    pub fn encode<W: Write>(&self, writer: W, record: RecordView<'_>) -> Result<u64> {
        let length = self.encoded_len(record)?;
        let name_len = record.name.len() as u32;

        let mut out = HashingWriter::new(writer);
        out.put(&record.kind.magic())?;
        out.put(&name_len.to_le_bytes())?;
        out.put(record.name.as_bytes())?;
        if record.kind == RecordKind::LookupParameter {
            out.put(&(record.tensors.len() as u64).to_le_bytes())?;
        }
        for tensor in record.tensors {
            encode_tensor(&mut out, tensor)?;
        }
        let digest = out.hasher.finalize();
        out.inner.write_all(digest.as_bytes())?;
        debug_assert_eq!(out.written + CHECKSUM_SIZE as u64, length);
        Ok(length)
    }

    /// Decodes one record from the reader's current position, which the caller reports as
    /// `offset` for diagnostics. Returns the record and the number of bytes it occupied.
    pub fn decode<R: Read>(&self, reader: R, offset: u64, budget: u64) -> Result<(Record, u64)> {
        let budget = budget.min(self.max_record_bytes);
        let mut input = HashingReader::new(reader, offset, budget);

        let magic: [u8; 4] = input.array()?;
        let kind = RecordKind::from_magic(magic)
            .ok_or_else(|| PackError::corrupt(offset, format!("unknown record marker {magic:02x?}")))?;

        let name_len = u32::from_le_bytes(input.array()?);
        if name_len > MAX_NAME_BYTES {
            return Err(PackError::corrupt(offset, "entity name length exceeds limit"));
        }
        let name_bytes = input.bytes(name_len as usize)?;
        let name = String::from_utf8(name_bytes)
            .map_err(|_| PackError::corrupt(offset, "entity name is not valid UTF-8"))?;

        let tensors = match kind {
            RecordKind::Parameter => vec![decode_tensor(&mut input)?],
            RecordKind::LookupParameter => {
                let rows = u64::from_le_bytes(input.array()?);
                // Each row needs at least a rank and a count.
                if rows.saturating_mul(12) > input.remaining() {
                    return Err(PackError::corrupt(offset, "lookup row count exceeds record"));
                }
                let mut tensors = Vec::with_capacity(usize::try_from(rows).unwrap_or(0));
                for _ in 0..rows {
                    tensors.push(decode_tensor(&mut input)?);
                }
                tensors
            }
        };

        let digest = input.hasher.finalize();
        let stored: [u8; CHECKSUM_SIZE] = input.raw_array()?;
        if digest.as_bytes() != &stored {
            if self.verify_checksums {
                return Err(PackError::corrupt(offset, "record checksum mismatch"));
            }
            tracing::warn!(offset, name = %name, "record checksum mismatch ignored");
        }

        tracing::trace!(offset, name = %name, %kind, length = input.consumed, "decoded record");
        Ok((
            Record {
                kind,
                name,
                tensors,
            },
            input.consumed,
        ))
    }
}

fn encode_tensor<W: Write>(out: &mut HashingWriter<W>, tensor: &Tensor) -> Result<()> {
    let dims = tensor.shape().dims();
    out.put(&(dims.len() as u32).to_le_bytes())?;
    for dim in dims {
        out.put(&(*dim as u64).to_le_bytes())?;
    }
    out.put(&(tensor.values().len() as u64).to_le_bytes())?;

    let mut buf = Vec::with_capacity(VALUE_CHUNK * VALUE_SIZE as usize);
    for chunk in tensor.values().chunks(VALUE_CHUNK) {
        buf.clear();
        for value in chunk {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        out.put(&buf)?;
    }
    Ok(())
}

fn decode_tensor<R: Read>(input: &mut HashingReader<R>) -> Result<Tensor> {
    let offset = input.offset;
    let rank = u32::from_le_bytes(input.array()?);
    if rank > MAX_RANK {
        return Err(PackError::corrupt(offset, format!("tensor rank {rank} exceeds limit")));
    }
    let mut dims = Vec::with_capacity(rank as usize);
    for _ in 0..rank {
        let dim = u64::from_le_bytes(input.array()?);
        let dim = usize::try_from(dim)
            .ok()
            .filter(|dim| *dim > 0)
            .ok_or_else(|| PackError::corrupt(offset, format!("invalid dimension {dim}")))?;
        dims.push(dim);
    }
    let expected = checked_product(&dims)
        .ok_or_else(|| PackError::corrupt(offset, "shape element count overflows"))?;

    let count = u64::from_le_bytes(input.array()?);
    if count != expected as u64 {
        return Err(PackError::corrupt(
            offset,
            format!("shape {dims:?} holds {expected} elements but record declares {count}"),
        ));
    }
    if count > MAX_TENSOR_ELEMENTS || count.saturating_mul(VALUE_SIZE) > input.remaining() {
        return Err(PackError::corrupt(offset, "tensor values exceed record bounds"));
    }

    let count = expected;
    let mut values = Vec::with_capacity(count);
    let mut buf = vec![0u8; VALUE_CHUNK.min(count.max(1)) * VALUE_SIZE as usize];
    let mut left = count;
    while left > 0 {
        let take = left.min(VALUE_CHUNK);
        let bytes = &mut buf[..take * VALUE_SIZE as usize];
        input.fill(bytes)?;
        values.extend(
            bytes
                .chunks_exact(VALUE_SIZE as usize)
                .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
        );
        left -= take;
    }

    let shape = Shape::new(dims).map_err(|err| PackError::corrupt(offset, err.to_string()))?;
    Tensor::new(shape, values).map_err(|err| PackError::corrupt(offset, err.to_string()))
}

struct HashingWriter<W> {
    inner: W,
    hasher: Hasher,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            written: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }
}

/// Reader that hashes what it yields and turns short reads into `Corrupt`.
struct HashingReader<R> {
    inner: R,
    hasher: Hasher,
    start: u64,
    offset: u64,
    consumed: u64,
    budget: u64,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R, start: u64, budget: u64) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            start,
            offset: start,
            consumed: 0,
            budget,
        }
    }

    fn remaining(&self) -> u64 {
        self.budget.saturating_sub(self.consumed)
    }

    fn fill_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 > self.remaining() {
            return Err(PackError::corrupt(self.start, "record extends past its indexed span"));
        }
        self.inner.read_exact(buf).map_err(|err| match err.kind() {
            ErrorKind::UnexpectedEof => PackError::corrupt(self.start, "record is truncated"),
            _ => err.into(),
        })?;
        self.consumed += buf.len() as u64;
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.fill_raw(buf)?;
        self.hasher.update(buf);
        Ok(())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    fn raw_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill_raw(&mut buf)?;
        Ok(buf)
    }

    fn bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_param() -> Parameter {
        Parameter::from_values(
            "w",
            &[3, 4],
            vec![
                0.0,
                -1.5,
                f32::MIN_POSITIVE,
                f32::MAX,
                f32::EPSILON,
                1.0e-30,
                -0.0,
                3.25,
                7.0,
                8.0,
                9.0,
                10.0,
            ],
        )
        .expect("param")
    }

    fn encode(record: RecordView<'_>) -> Vec<u8> {
        let mut buf = Vec::new();
        let len = RecordCodec::default()
            .encode(&mut buf, record)
            .expect("encode");
        assert_eq!(len, buf.len() as u64);
        buf
    }

    #[test]
    fn parameter_values_are_bit_identical() {
        let param = sample_param();
        let bytes = encode(RecordView::from(&param));
        let (record, consumed) = RecordCodec::default()
            .decode(Cursor::new(&bytes), 0, bytes.len() as u64)
            .expect("decode");
        assert_eq!(consumed, bytes.len() as u64);
        assert_eq!(record.kind, RecordKind::Parameter);
        let decoded = record.into_parameter().expect("parameter record");
        assert_eq!(decoded.shape(), param.shape());
        let original: Vec<u32> = param.values().iter().map(|v| v.to_bits()).collect();
        let restored: Vec<u32> = decoded.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(original, restored);
    }

    #[test]
    fn lookup_rows_keep_their_shapes() {
        let rows = vec![
            Tensor::new(Shape::new(vec![2]).unwrap(), vec![1.0, 2.0]).unwrap(),
            Tensor::new(Shape::new(vec![3]).unwrap(), vec![3.0, 4.0, 5.0]).unwrap(),
        ];
        let table = LookupParameter::new("emb", rows);
        let bytes = encode(RecordView::from(&table));
        let (record, _) = RecordCodec::default()
            .decode(Cursor::new(&bytes), 0, bytes.len() as u64)
            .expect("decode");
        let summary = record.summary(0, bytes.len() as u64);
        assert_eq!(summary.shapes, vec![vec![2], vec![3]]);
        assert_eq!(summary.elements, 5);
        assert_eq!(record.into_lookup().expect("lookup"), table);
    }

    #[test]
    fn unknown_marker_is_corrupt() {
        let mut bytes = encode(RecordView::from(&sample_param()));
        bytes[..4].copy_from_slice(b"NOPE");
        let err = RecordCodec::default()
            .decode(Cursor::new(&bytes), 0, bytes.len() as u64)
            .expect_err("bad marker");
        assert!(matches!(err, PackError::Corrupt { .. }));
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let bytes = encode(RecordView::from(&sample_param()));
        let cut = &bytes[..bytes.len() - 10];
        let err = RecordCodec::default()
            .decode(Cursor::new(cut), 0, u64::MAX)
            .expect_err("truncated");
        assert!(matches!(err, PackError::Corrupt { .. }));
    }

    #[test]
    fn count_disagreeing_with_shape_is_corrupt() {
        let param = Parameter::from_values("w", &[2], vec![1.0, 2.0]).unwrap();
        let mut bytes = encode(RecordView::from(&param));
        // marker(4) + name_len(4) + name(1) + rank(4) + dim(8) -> count
        let count_pos = 4 + 4 + 1 + 4 + 8;
        bytes[count_pos..count_pos + 8].copy_from_slice(&3u64.to_le_bytes());
        let err = RecordCodec::default()
            .decode(Cursor::new(&bytes), 0, bytes.len() as u64)
            .expect_err("count mismatch");
        match err {
            PackError::Corrupt { reason, .. } => assert!(reason.contains("declares 3")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn flipped_value_fails_checksum() {
        let mut bytes = encode(RecordView::from(&sample_param()));
        let idx = bytes.len() - CHECKSUM_SIZE - 1;
        bytes[idx] ^= 0x01;
        let err = RecordCodec::default()
            .decode(Cursor::new(&bytes), 0, bytes.len() as u64)
            .expect_err("checksum");
        assert!(matches!(err, PackError::Corrupt { .. }));

        let lenient = RecordCodec::from_config(&PackConfig {
            verify_checksums: false,
            ..PackConfig::default()
        });
        lenient
            .decode(Cursor::new(&bytes), 0, bytes.len() as u64)
            .expect("lenient decode");
    }

    #[test]
    fn budget_bounds_the_record() {
        let bytes = encode(RecordView::from(&sample_param()));
        let err = RecordCodec::default()
            .decode(Cursor::new(&bytes), 0, 20)
            .expect_err("over budget");
        assert!(matches!(err, PackError::Corrupt { .. }));
    }

    #[test]
    fn encoded_len_matches_encode() {
        let param = sample_param();
        let codec = RecordCodec::default();
        let expected = codec.encoded_len(RecordView::from(&param)).expect("len");
        assert_eq!(expected, encode(RecordView::from(&param)).len() as u64);

        let table = LookupParameter::zeros("emb", 3, &Shape::new(vec![2, 2]).unwrap());
        let expected = codec.encoded_len(RecordView::from(&table)).expect("len");
        assert_eq!(expected, encode(RecordView::from(&table)).len() as u64);
    }

    #[test]
    fn oversized_record_is_refused_before_writing() {
        let codec = RecordCodec::from_config(&PackConfig {
            max_record_bytes: 128,
            ..PackConfig::default()
        });
        let param = Parameter::zeros("w", Shape::new(vec![64]).unwrap());
        let mut buf = Vec::new();
        let err = codec
            .encode(&mut buf, RecordView::from(&param))
            .expect_err("over limit");
        assert!(matches!(err, PackError::RecordTooLarge { limit: 128, .. }));
        assert!(buf.is_empty());

        let small = Parameter::zeros("w", Shape::new(vec![8]).unwrap());
        let written = codec.encode(&mut buf, RecordView::from(&small)).expect("fits");
        let (record, _) = codec
            .decode(Cursor::new(&buf), 0, written)
            .expect("decodes under the same limit");
        assert_eq!(record.into_parameter().expect("parameter"), small);
    }

    #[test]
    fn long_names_are_refused_before_writing() {
        let param = Parameter::zeros("x".repeat(MAX_NAME_BYTES as usize + 1), Shape::scalar());
        let mut buf = Vec::new();
        let err = RecordCodec::default()
            .encode(&mut buf, RecordView::from(&param))
            .expect_err("long name");
        assert!(matches!(err, PackError::InvalidShape { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn scalar_parameter_roundtrips() {
        let param = Parameter::new("bias", Tensor::new(Shape::scalar(), vec![0.5]).unwrap());
        let bytes = encode(RecordView::from(&param));
        let (record, _) = RecordCodec::default()
            .decode(Cursor::new(&bytes), 0, bytes.len() as u64)
            .expect("decode");
        assert_eq!(record.into_parameter().expect("parameter"), param);
    }
}
