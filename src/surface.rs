use kurbo::{Affine, Rect};

use crate::{
    error::SkylightResult,
    geom::map_rect_aabb,
    model::LayerRecord,
    paint::LayerPaint,
};

/// The opaque drawing backend. Clip and compositing state live on a single
/// shared stack; `save`/`save_layer` return a checkpoint and `restore_to`
/// unwinds every entry above it, so a caller can bracket any subtree of
/// work and unwind it unconditionally, including on an aborted traversal.
pub trait Surface {
    /// Pushes the current transform/clip state; returns the checkpoint to
    /// restore to.
    fn save(&mut self) -> usize;

    /// Like `save`, but also opens an isolated compositing layer with the
    /// given paint (alpha, blend, image filters).
    fn save_layer(&mut self, paint: &LayerPaint) -> usize;

    /// Unwinds the state stack back to a checkpoint from `save` or
    /// `save_layer`. Unwinding past already-restored checkpoints is a no-op.
    fn restore_to(&mut self, checkpoint: usize);

    /// Appends a transform to the current transform matrix.
    fn concat(&mut self, transform: Affine);

    /// Intersects the current clip with a rectangle in current-transform
    /// coordinates.
    fn clip_rect(&mut self, rect: Rect);

    /// True when a rectangle in current-transform coordinates cannot
    /// intersect the current clip, so drawing it can be skipped.
    fn quick_reject(&mut self, rect: Rect) -> bool;

    /// Draws one leaf layer's content at its frame. The backend owns all
    /// pixel-level work; the scene graph never inspects the result.
    fn draw_layer(&mut self, record: &LayerRecord, frame: Rect) -> SkylightResult<()>;
}

/// One recorded surface call, for asserting on render order in tests and
/// for tracing a render without a real backend.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    Save,
    SaveLayer { alpha: f64 },
    RestoreTo(usize),
    Concat(Affine),
    ClipRect(Rect),
    Draw { name: String, frame: Rect },
}

#[derive(Clone, Debug)]
struct SurfaceState {
    ctm: Affine,
    clip: Rect,
}

/// A backend that records every call and models just enough state (CTM and
/// clip stack) to answer `quick_reject` honestly against a viewport.
#[derive(Debug)]
pub struct RecordingSurface {
    ops: Vec<SurfaceOp>,
    states: Vec<SurfaceState>,
}

const UNBOUNDED: Rect = Rect::new(f64::MIN, f64::MIN, f64::MAX, f64::MAX);

impl RecordingSurface {
    pub fn new() -> Self {
        Self::with_clip(UNBOUNDED)
    }

    /// A surface clipped to a viewport, so off-viewport content gets
    /// quick-rejected.
    pub fn with_viewport(viewport: Rect) -> Self {
        Self::with_clip(viewport)
    }

    fn with_clip(clip: Rect) -> Self {
        Self {
            ops: Vec::new(),
            states: vec![SurfaceState {
                ctm: Affine::IDENTITY,
                clip,
            }],
        }
    }

    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    /// The names of drawn layers, in paint order.
    pub fn drawn(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::Draw { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Depth of the save stack; zero once everything is restored.
    pub fn open_saves(&self) -> usize {
        self.states.len() - 1
    }

    fn top(&mut self) -> &mut SurfaceState {
        self.states.last_mut().unwrap()
    }

    fn push_state(&mut self) -> usize {
        let checkpoint = self.states.len();
        let top = self.states.last().unwrap().clone();
        self.states.push(top);
        checkpoint
    }

    fn clips_out(&self, rect: Rect) -> bool {
        let state = self.states.last().unwrap();
        let device = map_rect_aabb(state.ctm, rect);
        device.intersect(state.clip).is_zero_area()
    }
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for RecordingSurface {
    fn save(&mut self) -> usize {
        self.ops.push(SurfaceOp::Save);
        self.push_state()
    }

    fn save_layer(&mut self, paint: &LayerPaint) -> usize {
        self.ops.push(SurfaceOp::SaveLayer { alpha: paint.alpha });
        self.push_state()
    }

    fn restore_to(&mut self, checkpoint: usize) {
        if checkpoint < 1 || checkpoint >= self.states.len() {
            return;
        }
        self.ops.push(SurfaceOp::RestoreTo(checkpoint));
        self.states.truncate(checkpoint);
    }

    fn concat(&mut self, transform: Affine) {
        self.ops.push(SurfaceOp::Concat(transform));
        let top = self.top();
        top.ctm = top.ctm * transform;
    }

    fn clip_rect(&mut self, rect: Rect) {
        self.ops.push(SurfaceOp::ClipRect(rect));
        let ctm = self.states.last().unwrap().ctm;
        let device = map_rect_aabb(ctm, rect);
        let top = self.top();
        top.clip = top.clip.intersect(device);
    }

    fn quick_reject(&mut self, rect: Rect) -> bool {
        self.clips_out(rect)
    }

    fn draw_layer(&mut self, record: &LayerRecord, frame: Rect) -> SkylightResult<()> {
        self.ops.push(SurfaceOp::Draw {
            name: record.name.clone(),
            frame,
        });
        Ok(())
    }
}
