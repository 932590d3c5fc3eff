//! Parameter binding.
//!
//! The [`Binder`] pairs the placeholders of a query with the caller's argument sources,
//! resolves them in placeholder order and lays the values out into a [`ParameterVector`].
//!
//! How a value occupies slots is decided by a [`SlotLayout`]. The default
//! [`LargeObjectLayout`] uses one slot for scalars and four for BLOB/CLOB values
//! (data, length, two reserved slots). Drivers read values back through the same layout,
//! so a driver with a different large-object convention only needs another layout.

use crate::argument::{ArgumentSource, HandleCache, Resolver};
use crate::error::{DbdError, DbdResult};
use crate::placeholder::{self, ParamType, Placeholder};
use std::fmt;
use std::sync::Arc;

/// One positional entry of the parameter vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Decoded value; `None` is SQL NULL.
    Value(Option<Vec<u8>>),
    /// Length of the preceding large-object value.
    Length(usize),
    /// Reserved by the calling convention; always empty.
    Reserved,
}

/// Slot layout for a parameter type.
pub trait SlotLayout: fmt::Debug + Send + Sync {
    /// Number of slots a value of `ty` occupies.
    fn slot_count(&self, ty: ParamType) -> usize;

    /// Append the slots for one value.
    fn lay_out(&self, ty: ParamType, value: Option<Vec<u8>>, out: &mut Vec<Slot>);

    /// Read a value back from exactly `slot_count(ty)` slots.
    fn read<'v>(&self, ty: ParamType, slots: &'v [Slot]) -> Option<&'v [u8]>;
}

/// Scalars take one slot; BLOB/CLOB take four: data, length, reserved, reserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargeObjectLayout;

impl SlotLayout for LargeObjectLayout {
    fn slot_count(&self, ty: ParamType) -> usize {
        if ty.is_large_object() { 4 } else { 1 }
    }

    fn lay_out(&self, ty: ParamType, value: Option<Vec<u8>>, out: &mut Vec<Slot>) {
        if ty.is_large_object() {
            let len = value.as_ref().map_or(0, Vec::len);
            out.push(Slot::Value(value));
            out.push(Slot::Length(len));
            out.push(Slot::Reserved);
            out.push(Slot::Reserved);
        } else {
            out.push(Slot::Value(value));
        }
    }

    fn read<'v>(&self, ty: ParamType, slots: &'v [Slot]) -> Option<&'v [u8]> {
        let Some(Slot::Value(Some(bytes))) = slots.first() else {
            return None;
        };
        if ty.is_large_object() {
            match slots.get(1) {
                Some(Slot::Length(len)) => Some(&bytes[..(*len).min(bytes.len())]),
                _ => Some(bytes.as_slice()),
            }
        } else {
            Some(bytes.as_slice())
        }
    }
}

/// A parameter as a driver sees it: its declared type and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundParam<'v> {
    pub param_type: ParamType,
    /// `None` is SQL NULL.
    pub value: Option<&'v [u8]>,
}

impl BoundParam<'_> {
    /// The value as UTF-8 text, if it is valid.
    pub fn text(&self) -> Option<Result<&str, std::str::Utf8Error>> {
        self.value.map(std::str::from_utf8)
    }
}

/// Ordered parameter slots ready for execution. Owns every buffer it refers to.
#[derive(Debug, Clone)]
pub struct ParameterVector {
    placeholders: Vec<Placeholder>,
    slots: Vec<Slot>,
    layout: Arc<dyn SlotLayout>,
}

impl ParameterVector {
    /// Number of logical parameters (one per placeholder).
    pub fn len(&self) -> usize {
        self.placeholders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty()
    }

    /// Raw slots, in driver order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Walk the logical parameters, decoding slots through the layout.
    pub fn params(&self) -> impl Iterator<Item = BoundParam<'_>> + '_ {
        let mut offset = 0;
        self.placeholders.iter().map(move |p| {
            let ty = p.param_type;
            let n = self.layout.slot_count(ty);
            let end = (offset + n).min(self.slots.len());
            let window = &self.slots[offset..end];
            offset = end;
            let value = match ty {
                ParamType::Null => None,
                _ => self.layout.read(ty, window),
            };
            BoundParam {
                param_type: ty,
                value,
            }
        })
    }
}

/// Binds argument sources to the placeholders of a query.
#[derive(Debug, Clone)]
pub struct Binder {
    layout: Arc<dyn SlotLayout>,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new(Arc::new(LargeObjectLayout))
    }
}

impl Binder {
    pub fn new(layout: Arc<dyn SlotLayout>) -> Self {
        Self { layout }
    }

    /// Scan `query`, check the argument count, resolve each source in placeholder order
    /// and lay the values out.
    ///
    /// A count mismatch fails before any source is resolved.
    pub fn bind(
        &self,
        query: &str,
        sources: &[ArgumentSource],
        handles: &mut HandleCache,
    ) -> DbdResult<ParameterVector> {
        let scan = placeholder::scan(query);

        if scan.len() != sources.len() {
            return Err(DbdError::ArgumentCountMismatch {
                query: query.to_string(),
                expected: scan.len(),
                provided: sources.len(),
            });
        }

        let mut slots = Vec::with_capacity(scan.slot_count(self.layout.as_ref()));
        let mut resolver = Resolver::new(handles);

        for (p, source) in scan.placeholders.iter().zip(sources) {
            let resolved = resolver.resolve(source, query)?;
            self.layout.lay_out(p.param_type, resolved.bytes, &mut slots);
        }

        tracing::debug!(
            target: "dbd.bind",
            params = scan.len(),
            slots = slots.len(),
            "bound query parameters"
        );

        Ok(ParameterVector {
            placeholders: scan.placeholders,
            slots,
            layout: Arc::clone(&self.layout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::StreamKey;
    use std::io::Cursor;

    #[test]
    fn count_mismatch_fails_without_resolving() {
        let mut handles = HandleCache::new();
        let sources = vec![
            ArgumentSource::literal("1"),
            ArgumentSource::file("/does/not/exist"),
        ];
        let err = Binder::default()
            .bind("select * from t where id = %d", &sources, &mut handles)
            .unwrap_err();

        match err {
            DbdError::ArgumentCountMismatch {
                expected, provided, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(provided, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The file was never opened.
        assert!(!handles.contains(&StreamKey::parse("/does/not/exist")));
    }

    #[test]
    fn scalars_take_one_slot_each() {
        let mut handles = HandleCache::new();
        let sources = vec![
            ArgumentSource::literal("42"),
            ArgumentSource::literal("alice"),
            ArgumentSource::Null,
        ];
        let params = Binder::default()
            .bind("values (%d, %s, %s)", &sources, &mut handles)
            .unwrap();

        assert_eq!(params.len(), 3);
        assert_eq!(
            params.slots(),
            &[
                Slot::Value(Some(b"42".to_vec())),
                Slot::Value(Some(b"alice".to_vec())),
                Slot::Value(None),
            ]
        );
    }

    #[test]
    fn large_objects_take_four_slots() {
        let mut handles = HandleCache::new();
        handles.insert_reader(StreamKey::Stdin, Cursor::new(vec![0u8, 1, 2, 255]));
        let sources = vec![ArgumentSource::file("-"), ArgumentSource::literal("7")];
        let params = Binder::default()
            .bind("update t set data = %pDb where id = %d", &sources, &mut handles)
            .unwrap();

        assert_eq!(
            params.slots(),
            &[
                Slot::Value(Some(vec![0, 1, 2, 255])),
                Slot::Length(4),
                Slot::Reserved,
                Slot::Reserved,
                Slot::Value(Some(b"7".to_vec())),
            ]
        );

        let bound: Vec<_> = params.params().collect();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].param_type, ParamType::Blob);
        assert_eq!(bound[0].value, Some(&[0u8, 1, 2, 255][..]));
        assert_eq!(bound[1].param_type, ParamType::Int);
        assert_eq!(bound[1].value, Some(&b"7"[..]));
    }

    #[test]
    fn null_specifier_binds_null_regardless_of_argument() {
        let mut handles = HandleCache::new();
        let sources = vec![ArgumentSource::literal("ignored")];
        let params = Binder::default()
            .bind("insert into t values (%pDn)", &sources, &mut handles)
            .unwrap();
        let bound: Vec<_> = params.params().collect();
        assert_eq!(bound[0].value, None);
    }

    #[test]
    fn reused_stream_yields_empty_second_value() {
        let mut handles = HandleCache::new();
        handles.insert_reader(StreamKey::Stdin, Cursor::new(b"abc".to_vec()));
        let sources = vec![ArgumentSource::file("-"), ArgumentSource::file("-")];
        let params = Binder::default()
            .bind("values (%s, %s)", &sources, &mut handles)
            .unwrap();
        let bound: Vec<_> = params.params().collect();
        assert_eq!(bound[0].value, Some(&b"abc"[..]));
        assert_eq!(bound[1].value, Some(&b""[..]));
    }

    #[test]
    fn custom_layout_is_honoured() {
        #[derive(Debug)]
        struct Flat;
        impl SlotLayout for Flat {
            fn slot_count(&self, _: ParamType) -> usize {
                1
            }
            fn lay_out(&self, _: ParamType, value: Option<Vec<u8>>, out: &mut Vec<Slot>) {
                out.push(Slot::Value(value));
            }
            fn read<'v>(&self, _: ParamType, slots: &'v [Slot]) -> Option<&'v [u8]> {
                match slots.first() {
                    Some(Slot::Value(Some(v))) => Some(v),
                    _ => None,
                }
            }
        }

        let mut handles = HandleCache::new();
        let sources = vec![ArgumentSource::literal("blob")];
        let params = Binder::new(Arc::new(Flat))
            .bind("values (%pDc)", &sources, &mut handles)
            .unwrap();
        assert_eq!(params.slots().len(), 1);
        assert_eq!(params.params().next().unwrap().value, Some(&b"blob"[..]));
    }
}
