//! Document collaborator interface.
//!
//! The paint pipeline never parses files. It asks an [`ObjectResolver`] for
//! indirect objects and for the operator sequence of content streams.
//! [`MemoryDocument`] is an in-memory resolver used for synthesized content
//! (appearance streams built by a viewer) and by the test suite.

use super::content_stream::Operation;
use super::error::{PDFError, PDFResult};
use super::object::{Dict, PDFObject, Ref};
use rustc_hash::FxHashMap;
use std::borrow::Cow;

/// Maximum chain of references followed by [`ObjectResolver::fetch`].
const MAX_REF_CHAIN: usize = 32;

/// Source of objects and content operators for a document.
pub trait ObjectResolver {
    /// Looks up an indirect object.
    fn resolve(&self, reference: Ref) -> Option<PDFObject>;

    /// Tokenizes a content stream (page, form, pattern cell or appearance)
    /// into operators. The stream is passed with its filters still applied.
    fn content_operations(&self, dict: &Dict, data: &[u8]) -> PDFResult<Vec<Operation>>;

    /// Follows references until a direct object is reached.
    ///
    /// Missing objects and reference cycles yield `Null`.
    fn fetch<'a>(&self, obj: &'a PDFObject) -> Cow<'a, PDFObject> {
        let &PDFObject::Ref(mut reference) = obj else {
            return Cow::Borrowed(obj);
        };
        for _ in 0..MAX_REF_CHAIN {
            match self.resolve(reference) {
                Some(PDFObject::Ref(next)) => reference = next,
                Some(resolved) => return Cow::Owned(resolved),
                None => {
                    log::debug!("unresolved object {}", reference);
                    return Cow::Owned(PDFObject::Null);
                }
            }
        }
        log::warn!("reference chain starting at {} does not terminate", obj_ref(obj));
        Cow::Owned(PDFObject::Null)
    }

    /// Fetches `key` from `dict`, following references.
    fn fetch_key<'a>(&self, dict: &'a Dict, key: &str) -> Option<Cow<'a, PDFObject>> {
        dict.get(key).map(|v| self.fetch(v)).filter(|v| !v.is_null())
    }
}

fn obj_ref(obj: &PDFObject) -> String {
    obj.as_reference().map(|r| r.to_string()).unwrap_or_default()
}

/// In-memory document.
///
/// Content streams registered through [`MemoryDocument::content_stream`] carry
/// a unique key as their data; `content_operations` maps the key back to the
/// registered operators.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    objects: FxHashMap<Ref, PDFObject>,
    contents: FxHashMap<Vec<u8>, Vec<Operation>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an indirect object, replacing any previous one.
    pub fn insert(&mut self, reference: Ref, obj: PDFObject) -> Ref {
        self.objects.insert(reference, obj);
        reference
    }

    /// Builds a content stream object whose operators are `ops`.
    pub fn content_stream<'a>(
        &mut self,
        entries: impl IntoIterator<Item = (&'a str, PDFObject)>,
        ops: Vec<Operation>,
    ) -> PDFObject {
        let key = format!("%content {}", self.contents.len()).into_bytes();
        self.contents.insert(key.clone(), ops);
        PDFObject::stream(entries, key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectResolver for MemoryDocument {
    fn resolve(&self, reference: Ref) -> Option<PDFObject> {
        self.objects.get(&reference).cloned()
    }

    fn content_operations(&self, _dict: &Dict, data: &[u8]) -> PDFResult<Vec<Operation>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        self.contents
            .get(data)
            .cloned()
            .ok_or_else(|| PDFError::unresolved("content stream", "not registered with this document"))
    }
}
