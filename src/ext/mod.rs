/*
 * This Source Code Form is subject to the terms of the
 * Mozilla Public License, v. 2.0. If a copy of the MPL
 * was not distributed with this file, You can obtain one at http://mozilla.org/MPL/2.0/.
 */

//! Worked extensions built on top of [`crate::extension`] (spec
//! section 4.9): the core `ndarray`/`datatype` pair every ASDF
//! reader ships, plus `software`, which every writer uses to
//! self-identify in `history` and `asdf_library`.

pub mod datatype;
pub mod ndarray;
pub mod software;

/// Register every extension this crate ships with the process-wide
/// registry. Idempotent: a second call is a harmless no-op, since
/// [`crate::extension::register`] ignores later registrations for an
/// already-registered tag.
pub fn register_builtin()
{
    crate::extension::register::<ndarray::NdArray>();
    crate::extension::register::<software::Software>();
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::extension::ExtensionType;

    #[test]
    fn builtin_extensions_register_under_their_tags()
    {
        register_builtin();
        assert!(crate::extension::is_registered_tag(ndarray::NdArray::tag()));
        assert!(crate::extension::is_registered_tag(software::Software::tag()));
    }
}
