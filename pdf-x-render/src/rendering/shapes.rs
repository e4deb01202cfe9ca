//! Display list produced by content interpretation.
//!
//! [`Shapes`] is a flat list of [`DrawCmd`]s. Transforms and clips are stored
//! relative to the *base* transform, which is the device transform at the
//! moment playback starts; the same list can therefore be replayed at any
//! zoom or rotation, or into a pattern tile.

use super::context::AbortSignal;
use super::device::{Device, Paint};
use super::graphics_state::{ClipRegion, FillRule, ShapePaint, StrokeProps};
use super::image::ImageReference;
use super::path::Path;
use super::transform::{Matrix, concat};
use crate::core::error::PDFResult;
use std::sync::Arc;

/// One display list command.
#[derive(Debug, Clone)]
pub enum DrawCmd {
    /// Device transform becomes `base ∘ matrix`
    Transform(Matrix),
    /// Clip in base space, `None` restores the initial clip
    Clip(Option<ClipRegion>),
    Alpha(f32),
    Paint(ShapePaint),
    Fill(Path, FillRule),
    Stroke(Path, StrokeProps),
    /// Image drawn into the unit square of the current transform
    Image(Arc<ImageReference>),
}

/// A replayable list of drawing commands.
#[derive(Debug, Clone, Default)]
pub struct Shapes {
    commands: Vec<DrawCmd>,
}

impl Shapes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: DrawCmd) {
        self.commands.push(cmd);
    }

    pub fn commands(&self) -> &[DrawCmd] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Images referenced by the list, in paint order.
    pub fn images(&self) -> impl Iterator<Item = &Arc<ImageReference>> {
        self.commands.iter().filter_map(|cmd| match cmd {
            DrawCmd::Image(image) => Some(image),
            _ => None,
        })
    }

    /// Replays the list against `device`.
    ///
    /// The device transform and clip are restored when playback ends. Returns
    /// `false` if `abort` was raised before the last command.
    pub fn paint(&self, device: &mut dyn Device, abort: &AbortSignal) -> PDFResult<bool> {
        let base = device.transform();
        let initial_clip = device.clip();
        let result = self.paint_from(device, &base, &initial_clip, abort);
        device.set_transform(&base);
        device.set_clip(initial_clip);
        result
    }

    fn paint_from(
        &self,
        device: &mut dyn Device,
        base: &Matrix,
        initial_clip: &Option<ClipRegion>,
        abort: &AbortSignal,
    ) -> PDFResult<bool> {
        for cmd in &self.commands {
            if abort.is_aborted() {
                return Ok(false);
            }
            match cmd {
                DrawCmd::Transform(matrix) => device.set_transform(&concat(base, matrix)),
                DrawCmd::Clip(region) => {
                    let af = device.transform();
                    device.set_transform(base);
                    device.set_clip(initial_clip.clone());
                    if let Some(region) = region {
                        for (path, rule) in region.paths() {
                            device.clip_path(path, *rule);
                        }
                    }
                    device.set_transform(&af);
                }
                DrawCmd::Alpha(alpha) => device.set_alpha(*alpha),
                DrawCmd::Paint(ShapePaint::Color(color)) => device.set_paint(Paint::Solid(*color)),
                DrawCmd::Paint(ShapePaint::Pattern(pattern)) => {
                    let tile = pattern.paint_pattern(&device.transform(), base);
                    device.set_paint(Paint::Tile(tile));
                }
                DrawCmd::Fill(path, rule) => device.fill_path(path, *rule)?,
                DrawCmd::Stroke(path, stroke) => device.stroke_path(path, stroke)?,
                DrawCmd::Image(image) => match image.get_image() {
                    Some(data) => device.draw_image(&data)?,
                    None => log::debug!("skipping image without pixels: {:?}", image),
                },
            }
        }
        Ok(true)
    }
}
