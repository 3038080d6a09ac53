/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! The process-wide tag -> extension registry (spec section
//! 4.8).
//!
//! Grounded on the compressor registry
//! ([`crate::compression`]): the same "static map behind a
//! `OnceLock`, first registration wins" shape, generalized
//! from compressors to arbitrary typed domain objects via
//! [`std::any::Any`] downcasting rather than C's
//! `{init, decomp, destroy}` callback record.

use std::{
    any::Any,
    collections::HashMap,
    sync::{OnceLock, RwLock},
};

use serde_yaml::Value as YamlValue;

use crate::{
    emitter::Emitter,
    error::Result,
    stream::Stream,
    value::{Value, ValueError, ValueResult},
};

/// A Rust type that round-trips through a canonical ASDF tag.
///
/// Implemented once per worked extension (see [`crate::ext`]); the tag
/// and type name it returns are what [`register`], [`as_extension`] and
/// friends key off of.
pub trait ExtensionType: Sized + 'static
{
    /// The canonical tag this type serializes under, e.g.
    /// `"tag:stsci.edu:asdf/core/ndarray-1.0.0"`.
    fn tag() -> &'static str;

    /// A short, human name used by diagnostics and by the auto-generated
    /// wrapper functions (spec section 4.8).
    fn type_name() -> &'static str;

    fn deserialize(value: &Value) -> ValueResult<Self>;

    /// Build the tagged tree node for this value, appending any raw
    /// bytes it owns as a new block via `emitter`/`stream` and recording
    /// the resulting index (spec section 4.6, `value_of_T`: "calls
    /// `ext.serialize` to build a tagged node"). Extensions with nothing
    /// to append (e.g. [`crate::ext::software::Software`]) ignore both
    /// parameters.
    fn serialize(&self, emitter: &mut Emitter, stream: &mut Stream) -> Result<YamlValue>;
}

struct Descriptor
{
    tag:         &'static str,
    type_name:   &'static str,
    deserialize: fn(&Value) -> ValueResult<Box<dyn Any + Send + Sync>>,
    serialize:   fn(&(dyn Any + Send + Sync), &mut Emitter, &mut Stream) -> Result<YamlValue>,
}

struct Registry
{
    by_tag:  RwLock<HashMap<&'static str, Descriptor>>,
    by_type: RwLock<HashMap<&'static str, &'static str>>,
}

fn registry() -> &'static Registry
{
    static REGISTRY: OnceLock<Registry> = OnceLock::new();

    REGISTRY.get_or_init(|| Registry {
        by_tag:  RwLock::new(HashMap::new()),
        by_type: RwLock::new(HashMap::new()),
    })
}

/// Register `T` under its own `ExtensionType::tag()`. The first
/// registration for a tag wins; a later one logs a warning and is
/// ignored (spec section 4.8).
pub fn register<T: ExtensionType + Send + Sync>()
{
    let desc = Descriptor {
        tag:         T::tag(),
        type_name:   T::type_name(),
        deserialize: |value| {
            T::deserialize(value).map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
        },
        serialize: |obj, emitter, stream| {
            obj.downcast_ref::<T>()
                .expect("extension serialize called with mismatched type")
                .serialize(emitter, stream)
        },
    };

    let mut by_tag = registry().by_tag.write().expect("extension registry poisoned");

    if by_tag.contains_key(desc.tag)
    {
        log::warn!("extension for tag {:?} already registered; ignoring", desc.tag);
        return;
    }

    let mut by_type = registry().by_type.write().expect("extension registry poisoned");
    by_type.insert(desc.type_name, desc.tag);
    by_tag.insert(desc.tag, desc);
}

pub fn is_registered_tag(tag: &str) -> bool
{
    registry()
        .by_tag
        .read()
        .expect("extension registry poisoned")
        .contains_key(tag)
}

/// Deserialize `value` as `T`, matching on `T`'s tag if `value` carries
/// an explicit canonical tag, otherwise attempting `T`'s deserializer
/// directly (spec section 4.6, "Extension resolution").
pub fn as_extension<T: ExtensionType>(value: &Value) -> ValueResult<T>
{
    if let Some(tag) = value.canonical_tag()
    {
        if tag != T::tag()
        {
            return Err(ValueError::TypeMismatch);
        }
    }

    T::deserialize(value)
}

pub fn is_extension<T: ExtensionType>(value: &Value) -> bool
{
    as_extension::<T>(value).is_ok()
}

/// Build a tagged [`YamlValue`] from `obj`, appending any raw bytes it
/// owns as a new block on `stream` via `emitter` (spec section 4.6,
/// `value_of_T`).
pub fn value_of<T: ExtensionType>(
    obj: &T,
    emitter: &mut Emitter,
    stream: &mut Stream,
) -> Result<YamlValue>
{
    obj.serialize(emitter, stream)
}

/// Try every registered extension against `value` in registration order
/// until one succeeds, used when the caller has no specific `T` in mind
/// (spec section 4.6: "without a tag, attempts every registered
/// extension until one succeeds"). Returns the matching tag and the
/// type-erased object.
pub fn resolve_any(value: &Value) -> Option<(&'static str, Box<dyn Any + Send + Sync>)>
{
    let by_tag = registry().by_tag.read().expect("extension registry poisoned");

    if let Some(tag) = value.canonical_tag()
    {
        if let Some(desc) = by_tag.get(tag.as_str())
        {
            if let Ok(obj) = (desc.deserialize)(value)
            {
                return Some((desc.tag, obj));
            }
        }
        return None;
    }

    for desc in by_tag.values()
    {
        if let Ok(obj) = (desc.deserialize)(value)
        {
            return Some((desc.tag, obj));
        }
    }

    None
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::path::Path;

    struct Count(i64);

    impl ExtensionType for Count
    {
        fn tag() -> &'static str
        {
            "tag:example.com:count-1.0.0"
        }

        fn type_name() -> &'static str
        {
            "Count"
        }

        fn deserialize(value: &Value) -> ValueResult<Self>
        {
            match value.as_i64()
            {
                crate::value::ScalarResult::Ok(n) => Ok(Count(n)),
                _ => Err(ValueError::TypeMismatch),
            }
        }

        fn serialize(&self, _emitter: &mut Emitter, _stream: &mut Stream) -> Result<YamlValue>
        {
            Ok(YamlValue::Number(self.0.into()))
        }
    }

    #[test]
    fn register_and_round_trip()
    {
        register::<Count>();
        assert!(is_registered_tag(Count::tag()));

        let v = Value::new(YamlValue::Number(7.into()), Path::root());
        let c = as_extension::<Count>(&v).unwrap();
        assert_eq!(c.0, 7);

        let config = crate::config::Config::new();
        let mut emitter = Emitter::new(&config);
        let mut stream = Stream::from_bytes(Vec::new());
        let node = value_of(&c, &mut emitter, &mut stream).unwrap();
        assert_eq!(node, YamlValue::Number(7.into()));
    }
}
