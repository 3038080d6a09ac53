/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! A typed view over a YAML tree node (spec section 4.6):
//! scalar type inference, overflow-checked conversions, tag
//! -> extension resolution, and BFS/DFS traversal.
//!
//! The external YAML engine this crate builds on top of is
//! `serde_yaml`; [`Value`] wraps one `serde_yaml::Value` node
//! together with the bookkeeping the teacher's equivalent
//! node type carries - a cached canonical tag, a cached
//! inferred narrow type, and the path from the document root.

use std::{cell::RefCell, collections::VecDeque, fmt};

use serde_yaml::Value as YamlValue;

use crate::path::Path;

/// The coarse YAML node kind, fixed the first time it is resolved and
/// never changed afterward (spec section 4.6: "fixes a bug where
/// subsequent extension resolution would hide the underlying YAML
/// shape").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind
{
    Null,
    Bool,
    Number,
    String,
    Mapping,
    Sequence,
}

/// The narrowest scalar type a bare (untagged) value infers to (spec
/// section 4.6, "Scalar inference").
#[derive(Debug, Clone, PartialEq)]
pub enum Inferred
{
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    String(String),
    Mapping,
    Sequence,
}

/// Failure modes for value-layer operations that are not bare scalar
/// conversions (spec section 7, "Value-layer results").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueError
{
    NotFound,
    TypeMismatch,
    Overflow,
    ParseFailure,
    Oom,
    Unknown,
}

impl fmt::Display for ValueError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            ValueError::NotFound => f.write_str("path did not resolve to a value"),
            ValueError::TypeMismatch => f.write_str("value's inferred type does not match"),
            ValueError::Overflow => f.write_str("value does not fit in the requested type"),
            ValueError::ParseFailure => f.write_str("extension deserializer rejected the value"),
            ValueError::Oom => f.write_str("allocation failed"),
            ValueError::Unknown => f.write_str("unknown value error"),
        }
    }
}

impl std::error::Error for ValueError {}

pub type ValueResult<T> = std::result::Result<T, ValueError>;

/// Result of a bare scalar conversion (spec section 4.6, "Conversion
/// contract"). Unlike [`ValueResult`], narrowing failure still carries
/// the truncated low-bits value rather than discarding it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarResult<T>
{
    Ok(T),
    /// Narrowing lost information; the payload is the truncated
    /// (wrapped) value, matching the contract's "OVERFLOW with the low
    /// bits".
    Overflow(T),
    TypeMismatch,
    Oom,
    Unknown,
}

impl<T: Copy> ScalarResult<T>
{
    pub fn is_ok(&self) -> bool
    {
        matches!(self, ScalarResult::Ok(_))
    }

    /// The converted value, present for both `Ok` and `Overflow` (the
    /// latter as its truncated form).
    pub fn value(self) -> Option<T>
    {
        match self
        {
            ScalarResult::Ok(v) | ScalarResult::Overflow(v) => Some(v),
            _ => None,
        }
    }

    pub fn ok(self) -> Option<T>
    {
        match self
        {
            ScalarResult::Ok(v) => Some(v),
            _ => None,
        }
    }
}

/// A typed view over one YAML node plus the bookkeeping the value layer
/// attaches to it.
pub struct Value
{
    node: YamlValue,
    path: Path,
    raw:  RefCell<Option<RawKind>>,
    inferred: RefCell<Option<Inferred>>,
}

impl Clone for Value
{
    fn clone(&self) -> Self
    {
        Self {
            node: self.node.clone(),
            path: self.path.clone(),
            raw:  RefCell::new(*self.raw.borrow()),
            inferred: RefCell::new(self.inferred.borrow().clone()),
        }
    }
}

impl fmt::Debug for Value
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Value")
            .field("path", &self.path.emit())
            .field("node", &self.node)
            .finish()
    }
}

impl Value
{
    pub fn new(node: YamlValue, path: Path) -> Self
    {
        Self {
            node,
            path,
            raw: RefCell::new(None),
            inferred: RefCell::new(None),
        }
    }

    pub fn at_root(node: YamlValue) -> Self
    {
        Self::new(node, Path::root())
    }

    pub fn node(&self) -> &YamlValue
    {
        &self.node
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// The node's explicit YAML tag, if it carries one (spec section
    /// 4.6). `None` for a bare scalar or container whose type is
    /// inferred rather than declared.
    pub fn canonical_tag(&self) -> Option<String>
    {
        match &self.node
        {
            YamlValue::Tagged(t) => Some(t.tag.to_string()),
            _ => None,
        }
    }

    fn resolve_raw(&self) -> RawKind
    {
        let inner = match &self.node
        {
            YamlValue::Tagged(t) => &t.value,
            other => other,
        };

        match inner
        {
            YamlValue::Null => RawKind::Null,
            YamlValue::Bool(_) => RawKind::Bool,
            YamlValue::Number(_) => RawKind::Number,
            YamlValue::String(_) => RawKind::String,
            YamlValue::Mapping(_) => RawKind::Mapping,
            YamlValue::Sequence(_) => RawKind::Sequence,
            YamlValue::Tagged(_) => unreachable!("tags are unwrapped above"),
        }
    }

    /// The underlying YAML node kind, fixed on first call (spec section
    /// 4.6).
    pub fn raw_kind(&self) -> RawKind
    {
        if let Some(k) = *self.raw.borrow()
        {
            return k;
        }

        let k = self.resolve_raw();
        *self.raw.borrow_mut() = Some(k);
        k
    }

    pub fn is_scalar(&self) -> bool
    {
        matches!(
            self.raw_kind(),
            RawKind::Null | RawKind::Bool | RawKind::Number | RawKind::String
        )
    }

    fn compute_inferred(&self) -> Inferred
    {
        let inner = match &self.node
        {
            YamlValue::Tagged(t) => &t.value,
            other => other,
        };

        match inner
        {
            YamlValue::Null => Inferred::Null,
            YamlValue::Bool(b) => Inferred::Bool(*b),
            YamlValue::Number(n) => infer_number(n),
            YamlValue::String(s) => infer_string(s),
            YamlValue::Mapping(_) => Inferred::Mapping,
            YamlValue::Sequence(_) => Inferred::Sequence,
            YamlValue::Tagged(_) => unreachable!("tags are unwrapped above"),
        }
    }

    /// The narrowest bare-scalar type this value infers to (spec section
    /// 4.6). An explicit YAML tag (`!!str`, `!!bool`, ...) overrides
    /// inference and is resolved by `serde_yaml` itself before this
    /// layer sees the node.
    pub fn inferred(&self) -> Inferred
    {
        if let Some(i) = self.inferred.borrow().clone()
        {
            return i;
        }

        let i = self.compute_inferred();
        *self.inferred.borrow_mut() = Some(i.clone());
        i
    }

    fn as_i128(&self) -> Option<i128>
    {
        match self.inferred()
        {
            Inferred::Int8(v) => Some(v as i128),
            Inferred::Int16(v) => Some(v as i128),
            Inferred::Int32(v) => Some(v as i128),
            Inferred::Int64(v) => Some(v as i128),
            Inferred::Uint64(v) => Some(v as i128),
            Inferred::Bool(b) => Some(b as i128),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> ScalarResult<bool>
    {
        match self.inferred()
        {
            Inferred::Bool(b) => ScalarResult::Ok(b),
            _ => ScalarResult::TypeMismatch,
        }
    }

    pub fn as_f64(&self) -> ScalarResult<f64>
    {
        match self.inferred()
        {
            Inferred::Double(v) => ScalarResult::Ok(v),
            Inferred::Int8(v) => ScalarResult::Ok(v as f64),
            Inferred::Int16(v) => ScalarResult::Ok(v as f64),
            Inferred::Int32(v) => ScalarResult::Ok(v as f64),
            Inferred::Int64(v) => ScalarResult::Ok(v as f64),
            Inferred::Uint64(v) => ScalarResult::Ok(v as f64),
            _ => ScalarResult::TypeMismatch,
        }
    }

    pub fn as_f32(&self) -> ScalarResult<f32>
    {
        match self.as_f64()
        {
            ScalarResult::Ok(v) =>
            {
                if v.is_finite() && v.abs() > f32::MAX as f64
                {
                    ScalarResult::Overflow(v as f32)
                }
                else
                {
                    ScalarResult::Ok(v as f32)
                }
            },
            _ => ScalarResult::TypeMismatch,
        }
    }

    pub fn as_str(&self) -> ScalarResult<&str>
    {
        match &self.node
        {
            YamlValue::String(s) => ScalarResult::Ok(s),
            YamlValue::Tagged(t) =>
            {
                if let YamlValue::String(s) = &t.value
                {
                    ScalarResult::Ok(s)
                }
                else
                {
                    ScalarResult::TypeMismatch
                }
            },
            _ => ScalarResult::TypeMismatch,
        }
    }

    pub fn as_mapping(&self) -> ValueResult<&serde_yaml::Mapping>
    {
        match &self.node
        {
            YamlValue::Mapping(m) => Ok(m),
            YamlValue::Tagged(t) =>
            {
                if let YamlValue::Mapping(m) = &t.value
                {
                    Ok(m)
                }
                else
                {
                    Err(ValueError::TypeMismatch)
                }
            },
            _ => Err(ValueError::TypeMismatch),
        }
    }

    pub fn as_sequence(&self) -> ValueResult<&[YamlValue]>
    {
        match &self.node
        {
            YamlValue::Sequence(s) => Ok(s),
            YamlValue::Tagged(t) =>
            {
                if let YamlValue::Sequence(s) = &t.value
                {
                    Ok(s)
                }
                else
                {
                    Err(ValueError::TypeMismatch)
                }
            },
            _ => Err(ValueError::TypeMismatch),
        }
    }

    /// The immediate children of a container node, each carrying its
    /// path extended by the key or index it was reached through. Empty
    /// for a scalar (spec section 4.6, `container_iter`).
    pub fn children(&self) -> Vec<Value>
    {
        match &self.node
        {
            YamlValue::Mapping(m) => m
                .iter()
                .map(|(k, v)| {
                    let path = match k.as_str()
                    {
                        Some(s) => self.path.child_key(s),
                        None => self.path.child_key(yaml_key_to_string(k)),
                    };
                    Value::new(v.clone(), path)
                })
                .collect(),
            YamlValue::Sequence(s) => s
                .iter()
                .enumerate()
                .map(|(i, v)| Value::new(v.clone(), self.path.child_index(i)))
                .collect(),
            YamlValue::Tagged(t) => Value::new((**t).value.clone(), self.path.clone()).children(),
            _ => Vec::new(),
        }
    }

    /// Look up a mapping child by key, or a sequence child by index
    /// (accepting either a decimal string or a bracketed form), without
    /// resolving a full [`Path`].
    pub fn get(&self, key: &str) -> Option<Value>
    {
        if let Ok(m) = self.as_mapping()
        {
            if let Some(v) = m.get(key)
            {
                return Some(Value::new(v.clone(), self.path.child_key(key)));
            }
        }

        if let Ok(s) = self.as_sequence()
        {
            if let Ok(i) = key.parse::<usize>()
            {
                return s.get(i).map(|v| Value::new(v.clone(), self.path.child_index(i)));
            }
        }

        None
    }

    /// Resolve a full [`Path`] against this value as the root, handling
    /// the `ANY` ambiguity between mapping keys and sequence indices
    /// (spec section 4.7).
    pub fn resolve(&self, path: &Path) -> ValueResult<Value>
    {
        let mut current = self.clone();

        for seg in &path.segments
        {
            current = match seg
            {
                crate::path::Segment::Key(k) => current.get(k).ok_or(ValueError::NotFound)?,
                crate::path::Segment::Any(s) => current.get(s).ok_or(ValueError::NotFound)?,
                crate::path::Segment::Index(i) =>
                {
                    let seq = current.as_sequence().map_err(|_| ValueError::NotFound)?;
                    let len = seq.len() as i64;
                    let idx = if *i < 0 { len + i } else { *i };

                    if idx < 0 || idx >= len
                    {
                        return Err(ValueError::NotFound);
                    }

                    Value::new(seq[idx as usize].clone(), current.path.child_index(idx as usize))
                },
            };
        }

        Ok(current)
    }

    /// Breadth-first (or, if `depth_first`, depth-first) search for the
    /// first descendant matching `pred`. A scalar checks only itself
    /// (spec section 4.6, `find`/`find_ex`).
    pub fn find_ex(
        &self,
        mut pred: impl FnMut(&Value) -> bool,
        depth_first: bool,
        mut descend: impl FnMut(&Value) -> bool,
        max_depth: usize,
    ) -> Option<Value>
    {
        if self.is_scalar()
        {
            return if pred(self) { Some(self.clone()) } else { None };
        }

        let mut queue: VecDeque<(Value, usize)> = VecDeque::new();
        queue.push_back((self.clone(), 0));

        while let Some((v, depth)) = if depth_first { queue.pop_back() } else { queue.pop_front() }
        {
            if pred(&v)
            {
                return Some(v);
            }

            if depth >= max_depth || !descend(&v)
            {
                continue;
            }

            for child in v.children()
            {
                queue.push_back((child, depth + 1));
            }
        }

        None
    }

    pub fn find(&self, pred: impl FnMut(&Value) -> bool) -> Option<Value>
    {
        self.find_ex(pred, false, |_| true, usize::MAX)
    }
}

fn yaml_key_to_string(k: &YamlValue) -> String
{
    match k
    {
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Null => "null".to_string(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

fn infer_number(n: &serde_yaml::Number) -> Inferred
{
    if let Some(v) = n.as_i64()
    {
        narrow_signed(v)
    }
    else if let Some(v) = n.as_u64()
    {
        if v <= i64::MAX as u64
        {
            narrow_signed(v as i64)
        }
        else
        {
            Inferred::Uint64(v)
        }
    }
    else
    {
        Inferred::Double(n.as_f64().unwrap_or(0.0))
    }
}

fn narrow_signed(v: i64) -> Inferred
{
    if i8::try_from(v).is_ok()
    {
        Inferred::Int8(v as i8)
    }
    else if i16::try_from(v).is_ok()
    {
        Inferred::Int16(v as i16)
    }
    else if i32::try_from(v).is_ok()
    {
        Inferred::Int32(v as i32)
    }
    else
    {
        Inferred::Int64(v)
    }
}

fn infer_string(s: &str) -> Inferred
{
    match s
    {
        "null" | "Null" | "NULL" | "~" | "\u{2205}" => return Inferred::Null,
        "true" | "True" | "TRUE" => return Inferred::Bool(true),
        "false" | "False" | "FALSE" => return Inferred::Bool(false),
        _ =>
        {},
    }

    if let Ok(v) = s.parse::<i64>()
    {
        return narrow_signed(v);
    }

    if let Ok(v) = s.parse::<u64>()
    {
        return Inferred::Uint64(v);
    }

    if let Ok(v) = s.parse::<f64>()
    {
        return Inferred::Double(v);
    }

    Inferred::String(s.to_string())
}

macro_rules! int_conversion {
    ($name:ident, $t:ty) => {
        impl Value
        {
            pub fn $name(&self) -> ScalarResult<$t>
            {
                match self.as_i128()
                {
                    Some(v) => match <$t>::try_from(v)
                    {
                        Ok(n) => ScalarResult::Ok(n),
                        Err(_) => ScalarResult::Overflow(v as $t),
                    },
                    None => ScalarResult::TypeMismatch,
                }
            }
        }
    };
}

int_conversion!(as_i8, i8);
int_conversion!(as_i16, i16);
int_conversion!(as_i32, i32);
int_conversion!(as_i64, i64);
int_conversion!(as_u8, u8);
int_conversion!(as_u16, u16);
int_conversion!(as_u32, u32);
int_conversion!(as_u64, u64);

#[cfg(test)]
mod tests
{
    use super::*;

    fn scalar(s: &str) -> Value
    {
        let yaml: YamlValue = serde_yaml::from_str(s).unwrap();
        Value::at_root(yaml)
    }

    #[test]
    fn infers_narrowest_signed_width()
    {
        assert_eq!(scalar("5").inferred(), Inferred::Int8(5));
        assert_eq!(scalar("200").inferred(), Inferred::Int16(200));
        assert_eq!(scalar("70000").inferred(), Inferred::Int32(70000));
    }

    #[test]
    fn infers_unsigned_when_beyond_i64()
    {
        assert_eq!(scalar("18446744073709551615").inferred(), Inferred::Uint64(u64::MAX));
    }

    #[test]
    fn int8_overflow_carries_truncated_bits()
    {
        let v = scalar("128");
        assert_eq!(v.as_i8(), ScalarResult::Overflow(128i32 as i8));
        assert!(!v.as_i8().is_ok());
    }

    #[test]
    fn int8_in_range_round_trips()
    {
        let v = scalar("127");
        assert_eq!(v.as_i8(), ScalarResult::Ok(127));
    }

    #[test]
    fn uint8_rejects_negative_with_overflow()
    {
        let v = scalar("-1");
        assert!(matches!(v.as_u8(), ScalarResult::Overflow(_)));
    }

    #[test]
    fn mapping_numeric_key_resolves_via_any_segment()
    {
        let v = scalar("{0: x}");
        let path = Path::parse("/0").unwrap();
        let resolved = v.resolve(&path).unwrap();
        assert_eq!(resolved.as_str(), ScalarResult::Ok("x"));
    }

    #[test]
    fn sequence_numeric_index_resolves_via_any_segment()
    {
        let v = scalar("[y]");
        let path = Path::parse("/0").unwrap();
        let resolved = v.resolve(&path).unwrap();
        assert_eq!(resolved.as_str(), ScalarResult::Ok("y"));
    }

    #[test]
    fn find_stops_at_matching_scalar()
    {
        let v = scalar("{a: 1, b: {c: 2}}");
        let found = v.find(|n| n.as_i64() == ScalarResult::Ok(2));
        assert!(found.is_some());
    }

    #[test]
    fn is_t_matches_as_t_except_on_overflow()
    {
        let v = scalar("127");
        assert!(v.as_i8().is_ok());

        let overflowing = scalar("200");
        assert!(!overflowing.as_i8().is_ok());
    }
}
