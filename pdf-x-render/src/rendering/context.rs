//! Render context shared by every page of a document.
//!
//! The context owns what outlives one interpretation pass: the configuration,
//! the decoded-image pool, the image worker pool, the pattern and appearance
//! form caches and the progress listener. Wrap it in an `Arc` to share it between render threads.

use super::form::Form;
use super::image::{ImageDecoder, ImagePool, StreamImageDecoder};
use super::tiling_pattern::TilingPattern;
use crate::core::config::{Interpolation, RenderConfig, TileAntialias};
use crate::core::error::PDFResult;
use crate::core::object::Ref;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Anti-aliasing and sampling quality for one raster surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderHints {
    pub anti_alias: bool,
    pub interpolation: Interpolation,
}

impl Default for RenderHints {
    fn default() -> Self {
        RenderHints {
            anti_alias: true,
            interpolation: Interpolation::Bilinear,
        }
    }
}

/// Cooperative cancellation flag, checked between operators and between
/// display list commands.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Page painting progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintEvent {
    PaintingStarted,
    PaintingFinished,
    PaintingAborted,
}

type PaintListener = Box<dyn Fn(PaintEvent) + Send + Sync>;

/// Shared state for rendering one document.
pub struct RenderContext {
    config: RenderConfig,
    image_pool: ImagePool,
    image_workers: Option<rayon::ThreadPool>,
    image_decoder: Arc<dyn ImageDecoder>,
    patterns: Mutex<FxHashMap<Ref, Arc<TilingPattern>>>,
    forms: Mutex<FxHashMap<Ref, Arc<Form>>>,
    listener: Option<PaintListener>,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("config", &self.config)
            .field("image_pool", &self.image_pool)
            .field("image_workers", &self.image_workers.as_ref().map(|w| w.current_num_threads()))
            .finish_non_exhaustive()
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        RenderContext::new(RenderConfig::default())
    }
}

impl RenderContext {
    pub fn new(config: RenderConfig) -> Self {
        RenderContextBuilder {
            config,
            ..Default::default()
        }
        .build()
    }

    pub fn builder() -> RenderContextBuilder {
        RenderContextBuilder::default()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn image_pool(&self) -> &ImagePool {
        &self.image_pool
    }

    /// Worker pool for image decodes, `None` when proxying is disabled.
    pub fn image_workers(&self) -> Option<&rayon::ThreadPool> {
        self.image_workers.as_ref()
    }

    pub fn image_decoder(&self) -> Arc<dyn ImageDecoder> {
        self.image_decoder.clone()
    }

    /// Hints for page surfaces.
    pub fn page_hints(&self) -> RenderHints {
        RenderHints {
            anti_alias: self.config.antialiasing,
            interpolation: self.config.image_interpolation,
        }
    }

    /// Hints for tiling pattern tiles.
    pub fn tile_hints(&self) -> RenderHints {
        let anti_alias = match self.config.tiling_antialiasing {
            TileAntialias::On => true,
            TileAntialias::Off => false,
            TileAntialias::Default => self.config.antialiasing,
        };
        RenderHints {
            anti_alias,
            interpolation: self.config.tiling_interpolation,
        }
    }

    /// Returns the cached pattern for `reference`, creating it with `create`
    /// on first use.
    pub(crate) fn pattern_or_insert(
        &self,
        reference: Ref,
        create: impl FnOnce() -> Option<Arc<TilingPattern>>,
    ) -> Option<Arc<TilingPattern>> {
        let mut patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pattern) = patterns.get(&reference) {
            return Some(pattern.clone());
        }
        let pattern = create()?;
        patterns.insert(reference, pattern.clone());
        Some(pattern)
    }

    /// Drops every cached pattern tile, e.g. after a zoom change.
    pub fn reset_patterns(&self) {
        let patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        for pattern in patterns.values() {
            pattern.reset();
        }
    }

    /// Returns the cached form for `reference`, loading it with `load` on
    /// first use. Forms keep their display list, so an appearance painted on
    /// every frame is interpreted once.
    pub(crate) fn form_or_insert(
        &self,
        reference: Ref,
        load: impl FnOnce() -> PDFResult<Form>,
    ) -> PDFResult<Arc<Form>> {
        let mut forms = self.forms.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(form) = forms.get(&reference) {
            return Ok(form.clone());
        }
        let form = Arc::new(load()?);
        forms.insert(reference, form.clone());
        Ok(form)
    }

    /// Forgets a cached form, e.g. after its appearance stream was replaced.
    pub fn evict_form(&self, reference: Ref) -> bool {
        self.forms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&reference)
            .is_some()
    }

    pub(crate) fn notify(&self, event: PaintEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }
}

/// Builder for [`RenderContext`].
#[derive(Default)]
pub struct RenderContextBuilder {
    config: RenderConfig,
    image_decoder: Option<Arc<dyn ImageDecoder>>,
    listener: Option<PaintListener>,
}

impl RenderContextBuilder {
    pub fn config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn image_proxy(mut self, enabled: bool) -> Self {
        self.config.image_proxy = enabled;
        self
    }

    pub fn image_proxy_threads(mut self, threads: usize) -> Self {
        self.config.image_proxy_threads = threads.max(1);
        self
    }

    pub fn image_pool_capacity(mut self, capacity: usize) -> Self {
        self.config.image_pool_capacity = capacity.max(1);
        self
    }

    pub fn image_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.image_decoder = Some(decoder);
        self
    }

    pub fn listener(mut self, listener: impl Fn(PaintEvent) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Builds the context. A worker pool that cannot be started falls back
    /// to decoding on first use.
    pub fn build(self) -> RenderContext {
        let image_workers = if self.config.image_proxy {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.image_proxy_threads)
                .thread_name(|i| format!("pdf-image-{}", i))
                .build()
                .map_err(|e| log::warn!("image worker pool unavailable: {}", e))
                .ok()
        } else {
            None
        };

        RenderContext {
            image_pool: ImagePool::new(self.config.image_pool_capacity),
            image_workers,
            image_decoder: self
                .image_decoder
                .unwrap_or_else(|| Arc::new(StreamImageDecoder)),
            patterns: Mutex::new(FxHashMap::default()),
            forms: Mutex::new(FxHashMap::default()),
            listener: self.listener,
            config: self.config,
        }
    }
}
