/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! The `software` worked extension: `tag:stsci.edu:asdf/core/software-1.0.0`,
//! the record used throughout an ASDF tree's `history` and
//! `asdf_library` entries to name the program that wrote or
//! touched the file.
//!
//! Not part of the distilled specification's worked-extension
//! list, but present throughout `original_source/include/asdf/core/software.h`
//! and produced by every ASDF writer's own self-identification
//! block, so it is supplemented here alongside `ndarray`.

use serde_yaml::Value as YamlValue;

use crate::{
    emitter::Emitter,
    error::Result,
    extension::ExtensionType,
    stream::Stream,
    value::{ScalarResult, Value, ValueError, ValueResult},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Software
{
    pub name:      String,
    pub author:    Option<String>,
    pub homepage:  Option<String>,
    pub version:   String,
}

impl ExtensionType for Software
{
    fn tag() -> &'static str
    {
        "tag:stsci.edu:asdf/core/software-1.0.0"
    }

    fn type_name() -> &'static str
    {
        "Software"
    }

    fn deserialize(value: &Value) -> ValueResult<Self>
    {
        let name = match value.get("name")
        {
            Some(v) => match v.as_str()
            {
                ScalarResult::Ok(s) => s.to_string(),
                _ => return Err(ValueError::ParseFailure),
            },
            None => return Err(ValueError::ParseFailure),
        };

        let version = match value.get("version")
        {
            Some(v) => match v.as_str()
            {
                ScalarResult::Ok(s) => s.to_string(),
                _ => return Err(ValueError::ParseFailure),
            },
            None => return Err(ValueError::ParseFailure),
        };

        let author = optional_string(value, "author");
        let homepage = optional_string(value, "homepage");

        Ok(Software { name, author, homepage, version })
    }

    /// `Software` never owns raw bytes to append, so `emitter`/`stream`
    /// go unused.
    fn serialize(&self, _emitter: &mut Emitter, _stream: &mut Stream) -> Result<YamlValue>
    {
        let mut m = serde_yaml::Mapping::new();
        m.insert("name".into(), YamlValue::String(self.name.clone()));
        m.insert("version".into(), YamlValue::String(self.version.clone()));

        if let Some(author) = &self.author
        {
            m.insert("author".into(), YamlValue::String(author.clone()));
        }
        if let Some(homepage) = &self.homepage
        {
            m.insert("homepage".into(), YamlValue::String(homepage.clone()));
        }

        Ok(YamlValue::Mapping(m))
    }
}

fn optional_string(value: &Value, key: &str) -> Option<String>
{
    value.get(key).and_then(|v| match v.as_str()
    {
        ScalarResult::Ok(s) => Some(s.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::path::Path;

    #[test]
    fn round_trips_minimal_record()
    {
        let node: YamlValue = serde_yaml::from_str("name: asdf\nversion: 3.1.0\n").unwrap();
        let v = Value::new(node, Path::root());
        let sw = Software::deserialize(&v).unwrap();

        assert_eq!(sw.name, "asdf");
        assert_eq!(sw.author, None);

        let config = crate::config::Config::new();
        let mut emitter = Emitter::new(&config);
        let mut stream = Stream::from_bytes(Vec::new());
        let back = sw.serialize(&mut emitter, &mut stream).unwrap();
        let reparsed = Software::deserialize(&Value::new(back, Path::root())).unwrap();
        assert_eq!(sw, reparsed);
    }

    #[test]
    fn missing_name_is_rejected()
    {
        let node: YamlValue = serde_yaml::from_str("version: 1.0\n").unwrap();
        let v = Value::new(node, Path::root());
        assert!(Software::deserialize(&v).is_err());
    }
}
