/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! The `ndarray` worked extension (spec section 4.9): the
//! `tag:stsci.edu:asdf/core/ndarray-1.0.0` block descriptor and
//! the strided tile-read algorithm used to pull a sub-region
//! out of an array's raw bytes without materializing the whole
//! thing.

use serde_yaml::Value as YamlValue;

use crate::{
    emitter::Emitter,
    error::Result,
    extension::ExtensionType,
    stream::Stream,
    value::{ScalarResult, Value, ValueError, ValueResult},
};

use super::datatype::{Datatype, ScalarDatatype};

/// Where an array's raw bytes live.
#[derive(Debug, Clone, PartialEq)]
pub enum Source
{
    /// Index into the file's block vector (the common case).
    Internal(i64),
    /// An external or inline-base64 URI, carried opaquely; this crate
    /// does not fetch it.
    Uri(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Byteorder
{
    Big,
    Little,
}

impl Byteorder
{
    fn from_str(s: &str) -> ValueResult<Self>
    {
        match s
        {
            "big" => Ok(Byteorder::Big),
            "little" => Ok(Byteorder::Little),
            _ => Err(ValueError::ParseFailure),
        }
    }

    fn as_str(&self) -> &'static str
    {
        match self
        {
            Byteorder::Big => "big",
            Byteorder::Little => "little",
        }
    }

    fn native() -> Self
    {
        if cfg!(target_endian = "big") { Byteorder::Big } else { Byteorder::Little }
    }
}

/// An `ndarray` block descriptor, read from or destined for a tree node.
///
/// `data` only carries bytes on the write path: a value produced by
/// [`NdArray::deserialize`] always leaves it empty, since the
/// descriptor alone does not imply the whole (possibly large,
/// possibly compressed) block should be materialized eagerly - callers
/// read array bytes on demand through `File::block_data` instead.
/// [`NdArray::serialize`] appends whatever is in `data` as a new block
/// and overwrites `source` with the resulting index (spec section
/// 4.9).
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray
{
    pub source:    Source,
    pub datatype:  Datatype,
    pub byteorder: Byteorder,
    pub shape:     Vec<u64>,
    pub offset:    u64,
    pub strides:   Option<Vec<i64>>,
    pub data:      Vec<u8>,
}

impl NdArray
{
    /// Row-major (C order) strides in elements, used when the tree did
    /// not carry an explicit `strides` field (spec section 4.9).
    pub fn default_strides(&self) -> Vec<i64>
    {
        let mut strides = vec![1i64; self.shape.len()];

        for i in (0..self.shape.len().saturating_sub(1)).rev()
        {
            strides[i] = strides[i + 1] * self.shape[i + 1] as i64;
        }

        strides
    }

    fn strides_in_elements(&self) -> Vec<i64>
    {
        self.strides.clone().unwrap_or_else(|| self.default_strides())
    }

    /// Total element count across all axes.
    pub fn element_count(&self) -> u64
    {
        self.shape.iter().product()
    }

    /// Read the sub-tile `[origin, origin + shape)` out of `data`, the
    /// full decompressed block this array's `source` points at.
    ///
    /// When `dst_datatype` names a scalar type whose size matches the
    /// array's own element size, element-by-element byte-order
    /// conversion is applied (a no-op if byte orders already agree).
    /// A mismatched element size falls back to a raw per-element memcpy
    /// with a [`ValueError::TypeMismatch`] so the caller can tell the
    /// conversion was not actually performed (spec section 4.9,
    /// "Unsupported conversion").
    pub fn read_tile_ndim(
        &self,
        data: &[u8],
        origin: &[i64],
        tile_shape: &[i64],
        dst_datatype: Option<ScalarDatatype>,
    ) -> ValueResult<Vec<u8>>
    {
        let ndim = self.shape.len();

        if origin.len() != ndim || tile_shape.len() != ndim
        {
            return Err(ValueError::TypeMismatch);
        }

        let src_scalar = self.datatype.as_scalar().ok_or(ValueError::TypeMismatch)?;
        let elem_size = src_scalar.size();
        let strides = self.strides_in_elements();

        let mut normalized_origin = vec![0i64; ndim];
        for d in 0..ndim
        {
            let len = self.shape[d] as i64;
            let o = if origin[d] < 0 { len + origin[d] } else { origin[d] };

            if o < 0 || o + tile_shape[d] > len
            {
                return Err(ValueError::NotFound);
            }

            normalized_origin[d] = o;
        }

        let tile_elems: i64 = tile_shape.iter().product();
        let mut out = vec![0u8; tile_elems as usize * elem_size];

        let swap = self.byteorder != Byteorder::native();
        let convert = dst_datatype.map(|d| d.size() != elem_size).unwrap_or(false);

        // Odometer over the tile's own shape, fastest (last) axis first,
        // converting each flat tile position into a source byte offset via
        // the array's strides.
        let mut index = vec![0i64; ndim];

        for out_pos in (0..out.len()).step_by(elem_size)
        {
            let mut elem_offset = self.offset as i64;
            for d in 0..ndim
            {
                elem_offset += (normalized_origin[d] + index[d]) * strides[d];
            }

            let byte_offset = elem_offset as usize * elem_size;
            if byte_offset + elem_size > data.len()
            {
                return Err(ValueError::NotFound);
            }

            let src = &data[byte_offset..byte_offset + elem_size];
            let dst = &mut out[out_pos..out_pos + elem_size];

            if swap
            {
                for (i, b) in src.iter().rev().enumerate()
                {
                    dst[i] = *b;
                }
            }
            else
            {
                dst.copy_from_slice(src);
            }

            for d in (0..ndim).rev()
            {
                index[d] += 1;
                if index[d] < tile_shape[d]
                {
                    break;
                }
                index[d] = 0;
            }
        }

        if convert
        {
            return Err(ValueError::TypeMismatch);
        }

        Ok(out)
    }
}

impl ExtensionType for NdArray
{
    fn tag() -> &'static str
    {
        "tag:stsci.edu:asdf/core/ndarray-1.0.0"
    }

    fn type_name() -> &'static str
    {
        "NdArray"
    }

    fn deserialize(value: &Value) -> ValueResult<Self>
    {
        let source_value = value.get("source").ok_or(ValueError::ParseFailure)?;
        let source = match source_value.as_i64()
        {
            ScalarResult::Ok(n) => Source::Internal(n),
            _ => match source_value.as_str()
            {
                ScalarResult::Ok(s) => Source::Uri(s.to_string()),
                _ => return Err(ValueError::ParseFailure),
            },
        };

        let datatype_value = value.get("datatype").ok_or(ValueError::ParseFailure)?;
        let datatype = Datatype::parse(&datatype_value)?;

        let byteorder = match value.get("byteorder")
        {
            Some(v) => match v.as_str()
            {
                ScalarResult::Ok(s) => Byteorder::from_str(s)?,
                _ => return Err(ValueError::ParseFailure),
            },
            None => Byteorder::Little,
        };

        let shape_value = value.get("shape").ok_or(ValueError::ParseFailure)?;
        let shape_seq = shape_value.as_sequence().map_err(|_| ValueError::ParseFailure)?;

        if shape_seq.is_empty()
        {
            return Err(ValueError::ParseFailure);
        }

        let mut shape = Vec::with_capacity(shape_seq.len());
        for n in shape_seq
        {
            let v = n.as_u64().ok_or(ValueError::ParseFailure)?;
            if v == 0
            {
                return Err(ValueError::ParseFailure);
            }
            shape.push(v);
        }

        let offset = match value.get("offset")
        {
            Some(v) => match v.as_u64()
            {
                ScalarResult::Ok(n) => n,
                _ => return Err(ValueError::ParseFailure),
            },
            None => 0,
        };

        let strides = match value.get("strides")
        {
            Some(v) =>
            {
                let seq = v.as_sequence().map_err(|_| ValueError::ParseFailure)?;
                let mut out = Vec::with_capacity(seq.len());
                for n in seq
                {
                    out.push(n.as_i64().ok_or(ValueError::ParseFailure)?);
                }
                Some(out)
            },
            None => None,
        };

        Ok(NdArray { source, datatype, byteorder, shape, offset, strides, data: Vec::new() })
    }

    /// Append `self.data` as a new block on `stream` and emit a tagged
    /// node whose `source` is the resulting block index, per spec
    /// section 4.9: "append the data bytes as a new block and record
    /// the integer index as `source`". A `source` carried over from
    /// deserialization is ignored here; this is the write path, and the
    /// array's bytes always land in a fresh block.
    fn serialize(&self, emitter: &mut Emitter, stream: &mut Stream) -> Result<YamlValue>
    {
        let index = emitter.write_block(stream, &self.data)?;

        let mut m = serde_yaml::Mapping::new();

        m.insert("source".into(), YamlValue::Number((index as i64).into()));
        m.insert("datatype".into(), self.datatype.to_node());
        m.insert("byteorder".into(), YamlValue::String(self.byteorder.as_str().into()));
        m.insert(
            "shape".into(),
            YamlValue::Sequence(self.shape.iter().map(|n| YamlValue::Number((*n).into())).collect()),
        );

        if self.offset != 0
        {
            m.insert("offset".into(), YamlValue::Number(self.offset.into()));
        }

        if let Some(strides) = &self.strides
        {
            m.insert(
                "strides".into(),
                YamlValue::Sequence(strides.iter().map(|n| YamlValue::Number((*n).into())).collect()),
            );
        }

        Ok(YamlValue::Mapping(m))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::path::Path;

    fn parse(yaml: &str) -> Value
    {
        let node: YamlValue = serde_yaml::from_str(yaml).unwrap();
        Value::new(node, Path::root())
    }

    #[test]
    fn deserializes_basic_descriptor()
    {
        let v = parse("source: 0\ndatatype: int32\nbyteorder: little\nshape: [2, 3]\n");
        let nd = NdArray::deserialize(&v).unwrap();

        assert_eq!(nd.source, Source::Internal(0));
        assert_eq!(nd.shape, vec![2, 3]);
        assert_eq!(nd.default_strides(), vec![3, 1]);
    }

    #[test]
    fn rejects_zero_length_axis()
    {
        let v = parse("source: 0\ndatatype: int32\nshape: [0]\n");
        assert!(NdArray::deserialize(&v).is_err());
    }

    #[test]
    fn reads_contiguous_tile_from_2d_array()
    {
        let v = parse("source: 0\ndatatype: uint8\nbyteorder: little\nshape: [2, 3]\n");
        let nd = NdArray::deserialize(&v).unwrap();

        let data: Vec<u8> = (0u8..6).collect();
        let tile = nd.read_tile_ndim(&data, &[1, 0], &[1, 3], None).unwrap();

        assert_eq!(tile, vec![3, 4, 5]);
    }

    #[test]
    fn reads_single_element_tile_with_explicit_strides()
    {
        let v = parse(
            "source: 0\ndatatype: uint8\nbyteorder: little\nshape: [2, 2]\nstrides: [1, 2]\n",
        );
        let nd = NdArray::deserialize(&v).unwrap();

        let data: Vec<u8> = vec![10, 20, 30, 40];
        let tile = nd.read_tile_ndim(&data, &[1, 1], &[1, 1], None).unwrap();

        assert_eq!(tile, vec![data[1 + 2]]);
    }

    #[test]
    fn serialize_appends_a_new_block_and_records_its_index()
    {
        let nd = NdArray {
            source: Source::Internal(99),
            datatype: Datatype::Scalar(ScalarDatatype::UInt8),
            byteorder: Byteorder::native(),
            shape: vec![4],
            offset: 0,
            strides: None,
            data: vec![1, 2, 3, 4],
        };

        let config = crate::config::Config::new();
        let mut emitter = crate::emitter::Emitter::new(&config);
        let mut stream = crate::stream::Stream::from_bytes(Vec::new());

        let node = nd.serialize(&mut emitter, &mut stream).unwrap();
        let reparsed = NdArray::deserialize(&Value::new(node, Path::root())).unwrap();

        // The stream held no prior blocks, so the freshly appended one lands
        // at index 0, not the stale `source: 99` the descriptor carried in.
        assert_eq!(reparsed.source, Source::Internal(0));
        assert_eq!(reparsed.shape, vec![4]);
        assert_eq!(reparsed.datatype, Datatype::Scalar(ScalarDatatype::UInt8));
    }
}
