//! Typed view of a resource dictionary.
//!
//! Lookups resolve the entry once and memoize the typed value by name, so a
//! color space or pattern used many times on a page is built once and shared.

use super::color_space::ColorSpace;
use super::context::RenderContext;
use super::tiling_pattern::TilingPattern;
use crate::core::document::ObjectResolver;
use crate::core::error::{PDFError, PDFResult};
use crate::core::object::{Dict, PDFObject, Ref};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// An XObject looked up by name.
#[derive(Debug, Clone)]
pub struct XObject {
    pub reference: Option<Ref>,
    pub object: PDFObject,
}

impl XObject {
    /// `/Subtype` of the XObject stream.
    pub fn subtype(&self) -> Option<&str> {
        self.object
            .as_dictionary()
            .and_then(|d| d.get("Subtype"))
            .and_then(|s| s.as_name())
    }
}

#[derive(Debug, Default)]
pub struct Resources {
    dict: Dict,
    color_spaces: Mutex<FxHashMap<String, Arc<ColorSpace>>>,
    patterns: Mutex<FxHashMap<String, Option<Arc<TilingPattern>>>>,
}

impl Resources {
    pub fn new(dict: Dict) -> Self {
        Resources {
            dict,
            ..Default::default()
        }
    }

    pub fn empty() -> Arc<Resources> {
        Arc::new(Resources::default())
    }

    /// Reads `/Resources` from a stream or page dictionary.
    pub fn from_owner(owner: &Dict, resolver: &dyn ObjectResolver) -> Option<Arc<Resources>> {
        resolver
            .fetch_key(owner, "Resources")
            .and_then(|r| r.as_dictionary().cloned())
            .map(|dict| Arc::new(Resources::new(dict)))
    }

    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    fn entry(&self, category: &str, name: &str, resolver: &dyn ObjectResolver) -> Option<PDFObject> {
        let category = resolver.fetch_key(&self.dict, category)?;
        category.as_dictionary()?.get(name).cloned()
    }

    /// Resolves a color space operand of `cs`/`CS`.
    ///
    /// Names found under `/ColorSpace` take precedence; other names are the
    /// device and pattern families.
    pub fn color_space(&self, name: &str, resolver: &dyn ObjectResolver) -> PDFResult<Arc<ColorSpace>> {
        if let Some(space) = self
            .color_spaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(space.clone());
        }

        let space = match self.entry("ColorSpace", name, resolver) {
            Some(obj) => ColorSpace::from_object(&obj, resolver)?,
            None => ColorSpace::from_object(&PDFObject::name(name), resolver)?,
        };
        let space = Arc::new(space);
        self.color_spaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), space.clone());
        Ok(space)
    }

    /// Looks up a tiling pattern. Shading patterns yield `Ok(None)`.
    ///
    /// Patterns stored as indirect objects are shared through the render
    /// context so their tiles survive between pages.
    pub fn pattern(
        &self,
        name: &str,
        resolver: &dyn ObjectResolver,
        ctx: &RenderContext,
    ) -> PDFResult<Option<Arc<TilingPattern>>> {
        if let Some(pattern) = self
            .patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(pattern.clone());
        }

        let entry = self
            .entry("Pattern", name, resolver)
            .ok_or_else(|| PDFError::unresolved(format!("pattern /{}", name), "not in resources"))?;
        let build = |reference: Option<Ref>| -> PDFResult<Option<Arc<TilingPattern>>> {
            let obj = resolver.fetch(&entry);
            Ok(TilingPattern::from_object(reference, &obj, resolver)?.map(Arc::new))
        };
        let pattern = match entry.as_reference() {
            Some(reference) => {
                let mut failure = None;
                let shared = ctx.pattern_or_insert(reference, || match build(Some(reference)) {
                    Ok(pattern) => pattern,
                    Err(e) => {
                        failure = Some(e);
                        None
                    }
                });
                if let Some(e) = failure {
                    return Err(e);
                }
                shared
            }
            None => build(None)?,
        };

        self.patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), pattern.clone());
        Ok(pattern)
    }

    pub fn xobject(&self, name: &str, resolver: &dyn ObjectResolver) -> PDFResult<XObject> {
        let entry = self
            .entry("XObject", name, resolver)
            .ok_or_else(|| PDFError::unresolved(format!("XObject /{}", name), "not in resources"))?;
        let object = resolver.fetch(&entry).into_owned();
        if object.as_stream().is_none() {
            return Err(PDFError::unresolved(format!("XObject /{}", name), "not a stream"));
        }
        Ok(XObject {
            reference: entry.as_reference(),
            object,
        })
    }

    /// Graphics state parameter dictionary for `gs`.
    pub fn ext_gstate(&self, name: &str, resolver: &dyn ObjectResolver) -> PDFResult<Dict> {
        self.entry("ExtGState", name, resolver)
            .and_then(|entry| resolver.fetch(&entry).as_dictionary().cloned())
            .ok_or_else(|| PDFError::unresolved(format!("ExtGState /{}", name), "not in resources"))
    }
}
