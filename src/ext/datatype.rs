/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! The `datatype` half of the ndarray worked extension (spec
//! section 4.9): scalar names, `[name, string-length]` pairs,
//! and structured (field-sequence) datatypes.

use serde_yaml::Value as YamlValue;

use crate::value::{Value, ValueError, ValueResult};

/// A single scalar element type, named the way the ASDF standard names
/// them (`int8`, `float64`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarDatatype
{
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float16,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Bool8,
    /// Fixed-width ASCII string, element size in bytes.
    Ascii(usize),
    /// Fixed-width UCS-4 string, element count (4 bytes each).
    Ucs4(usize),
}

impl ScalarDatatype
{
    pub fn size(&self) -> usize
    {
        match self
        {
            ScalarDatatype::Int8 | ScalarDatatype::UInt8 | ScalarDatatype::Bool8 => 1,
            ScalarDatatype::Int16 | ScalarDatatype::UInt16 | ScalarDatatype::Float16 => 2,
            ScalarDatatype::Int32 | ScalarDatatype::UInt32 | ScalarDatatype::Float32 => 4,
            ScalarDatatype::Int64
            | ScalarDatatype::UInt64
            | ScalarDatatype::Float64
            | ScalarDatatype::Complex64 => 8,
            ScalarDatatype::Complex128 => 16,
            ScalarDatatype::Ascii(n) => *n,
            ScalarDatatype::Ucs4(n) => n * 4,
        }
    }

    pub fn name(&self) -> String
    {
        match self
        {
            ScalarDatatype::Int8 => "int8".into(),
            ScalarDatatype::UInt8 => "uint8".into(),
            ScalarDatatype::Int16 => "int16".into(),
            ScalarDatatype::UInt16 => "uint16".into(),
            ScalarDatatype::Int32 => "int32".into(),
            ScalarDatatype::UInt32 => "uint32".into(),
            ScalarDatatype::Int64 => "int64".into(),
            ScalarDatatype::UInt64 => "uint64".into(),
            ScalarDatatype::Float16 => "float16".into(),
            ScalarDatatype::Float32 => "float32".into(),
            ScalarDatatype::Float64 => "float64".into(),
            ScalarDatatype::Complex64 => "complex64".into(),
            ScalarDatatype::Complex128 => "complex128".into(),
            ScalarDatatype::Bool8 => "bool8".into(),
            ScalarDatatype::Ascii(n) => format!("[ascii, {n}]"),
            ScalarDatatype::Ucs4(n) => format!("[ucs4, {n}]"),
        }
    }

    fn from_name(name: &str) -> ValueResult<Self>
    {
        Ok(match name
        {
            "int8" => ScalarDatatype::Int8,
            "uint8" => ScalarDatatype::UInt8,
            "int16" => ScalarDatatype::Int16,
            "uint16" => ScalarDatatype::UInt16,
            "int32" => ScalarDatatype::Int32,
            "uint32" => ScalarDatatype::UInt32,
            "int64" => ScalarDatatype::Int64,
            "uint64" => ScalarDatatype::UInt64,
            "float16" => ScalarDatatype::Float16,
            "float32" => ScalarDatatype::Float32,
            "float64" => ScalarDatatype::Float64,
            "complex64" => ScalarDatatype::Complex64,
            "complex128" => ScalarDatatype::Complex128,
            "bool8" => ScalarDatatype::Bool8,
            _ => return Err(ValueError::ParseFailure),
        })
    }
}

/// A field of a structured datatype.
#[derive(Debug, Clone, PartialEq)]
pub struct Field
{
    pub name:     String,
    pub datatype: Datatype,
    pub shape:    Option<Vec<u64>>,
}

/// Either a scalar element type or a structured (record) type made of
/// named fields, per spec section 4.9.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype
{
    Scalar(ScalarDatatype),
    Struct(Vec<Field>),
}

impl Datatype
{
    /// Byte size of one element, ignoring any per-field `shape`
    /// repetition (callers multiply that in separately).
    pub fn element_size(&self) -> usize
    {
        match self
        {
            Datatype::Scalar(s) => s.size(),
            Datatype::Struct(fields) => fields
                .iter()
                .map(|f| {
                    let count: u64 = f.shape.as_ref().map(|s| s.iter().product()).unwrap_or(1);
                    f.datatype.element_size() * count as usize
                })
                .sum(),
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarDatatype>
    {
        match self
        {
            Datatype::Scalar(s) => Some(*s),
            Datatype::Struct(_) => None,
        }
    }

    /// Parse a `datatype` node, accepting a bare scalar name, a
    /// `[name, length]` pair for fixed-width strings, or a sequence of
    /// field mappings for structured types (spec section 4.9).
    pub fn parse(value: &Value) -> ValueResult<Self>
    {
        if let crate::value::ScalarResult::Ok(name) = value.as_str()
        {
            return Ok(Datatype::Scalar(ScalarDatatype::from_name(name)?));
        }

        if let Ok(seq) = value.as_sequence()
        {
            if is_string_pair(seq)
            {
                return Ok(Datatype::Scalar(parse_string_pair(value)?));
            }

            let mut fields = Vec::with_capacity(seq.len());

            for child in value.children()
            {
                fields.push(parse_field(&child)?);
            }

            return Ok(Datatype::Struct(fields));
        }

        Err(ValueError::TypeMismatch)
    }

    pub fn to_node(&self) -> YamlValue
    {
        match self
        {
            Datatype::Scalar(ScalarDatatype::Ascii(n)) =>
            {
                YamlValue::Sequence(vec![
                    YamlValue::String("ascii".into()),
                    YamlValue::Number((*n as u64).into()),
                ])
            },
            Datatype::Scalar(ScalarDatatype::Ucs4(n)) =>
            {
                YamlValue::Sequence(vec![
                    YamlValue::String("ucs4".into()),
                    YamlValue::Number((*n as u64).into()),
                ])
            },
            Datatype::Scalar(s) => YamlValue::String(s.name()),
            Datatype::Struct(fields) => YamlValue::Sequence(
                fields
                    .iter()
                    .map(|f| {
                        let mut m = serde_yaml::Mapping::new();
                        m.insert("name".into(), f.name.clone().into());
                        m.insert("datatype".into(), f.datatype.to_node());
                        if let Some(shape) = &f.shape
                        {
                            m.insert(
                                "shape".into(),
                                YamlValue::Sequence(
                                    shape.iter().map(|n| YamlValue::Number((*n).into())).collect(),
                                ),
                            );
                        }
                        YamlValue::Mapping(m)
                    })
                    .collect(),
            ),
        }
    }
}

fn is_string_pair(seq: &[YamlValue]) -> bool
{
    seq.len() == 2 && matches!(&seq[0], YamlValue::String(s) if s == "ascii" || s == "ucs4")
}

fn parse_string_pair(value: &Value) -> ValueResult<ScalarDatatype>
{
    let seq = value.as_sequence().map_err(|_| ValueError::TypeMismatch)?;
    let name = seq[0].as_str().ok_or(ValueError::TypeMismatch)?;
    let len = seq[1].as_u64().ok_or(ValueError::TypeMismatch)? as usize;

    match name
    {
        "ascii" => Ok(ScalarDatatype::Ascii(len)),
        "ucs4" => Ok(ScalarDatatype::Ucs4(len)),
        _ => Err(ValueError::ParseFailure),
    }
}

fn parse_field(value: &Value) -> ValueResult<Field>
{
    let name = value
        .get("name")
        .and_then(|v| v.as_str().ok().map(|s| s.to_string()))
        .ok_or(ValueError::ParseFailure)?;

    let datatype_value = value.get("datatype").ok_or(ValueError::ParseFailure)?;
    let datatype = Datatype::parse(&datatype_value)?;

    let shape = value.get("shape").and_then(|v| {
        v.as_sequence().ok().map(|s| {
            s.iter()
                .filter_map(|n| n.as_u64())
                .collect::<Vec<u64>>()
        })
    });

    Ok(Field { name, datatype, shape })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::path::Path;

    #[test]
    fn parses_scalar_name()
    {
        let v = Value::at_root(YamlValue::String("int64".into()));
        assert_eq!(Datatype::parse(&v).unwrap(), Datatype::Scalar(ScalarDatatype::Int64));
    }

    #[test]
    fn parses_fixed_width_ascii_pair()
    {
        let yaml: YamlValue = serde_yaml::from_str("[ascii, 12]").unwrap();
        let v = Value::new(yaml, Path::root());
        assert_eq!(Datatype::parse(&v).unwrap(), Datatype::Scalar(ScalarDatatype::Ascii(12)));
    }

    #[test]
    fn parses_structured_fields()
    {
        let yaml: YamlValue =
            serde_yaml::from_str("- {name: x, datatype: float64}\n- {name: y, datatype: int32}")
                .unwrap();
        let v = Value::new(yaml, Path::root());
        let dt = Datatype::parse(&v).unwrap();

        match dt
        {
            Datatype::Struct(fields) =>
            {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].name, "x");
                assert_eq!(fields[0].datatype, Datatype::Scalar(ScalarDatatype::Float64));
            },
            _ => panic!("expected structured datatype"),
        }
    }
}
