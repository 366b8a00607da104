//! The render phase: a single top-down traversal that brackets every view
//! in a surface save scope, quick-rejects offscreen subtrees, opens an
//! isolated compositing layer when the view's paint needs one, delegates
//! leaf drawing to the backend, and threads the sibling mask chain.

use crate::{
    error::SkylightResult,
    model::LayerKind,
    surface::Surface,
    view::{Scene, ViewId},
};

/// Renders the whole scene. Every surface scope opened below is unwound
/// before this returns, error or not, so an aborted traversal never leaves
/// the surface stack corrupted.
#[tracing::instrument(skip(scene, surface))]
pub fn render(scene: &mut Scene, surface: &mut dyn Surface) -> SkylightResult<()> {
    let checkpoint = surface.save();
    let result = render_view(scene, scene.root(), surface);
    surface.restore_to(checkpoint);
    result
}

fn render_view(scene: &mut Scene, id: ViewId, surface: &mut dyn Surface) -> SkylightResult<()> {
    let checkpoint = surface.save();
    let result = render_view_scoped(scene, id, surface);
    // The unconditional unwind also closes any compositing layer opened
    // inside the scope; restore order is inherently last-in-first-out.
    surface.restore_to(checkpoint);
    result
}

fn render_view_scoped(
    scene: &mut Scene,
    id: ViewId,
    surface: &mut dyn Surface,
) -> SkylightResult<()> {
    surface.concat(scene.view(id).transform().local());

    let render_frame = scene.render_frame(id);
    if can_quick_reject(scene, id) && surface.quick_reject(render_frame) {
        return Ok(());
    }

    if let Some(paint) = scene.resolve_paint(id) {
        surface.save_layer(&paint);
    }

    draw_self(scene, id, surface)?;
    render_children(scene, id, surface)
}

/// Masks must run their side effects even offscreen; everything else may
/// skip when fully outside the clip.
fn can_quick_reject(scene: &Scene, id: ViewId) -> bool {
    !scene.view(id).record().clipping_mask
}

fn draw_self(scene: &Scene, id: ViewId, surface: &mut dyn Surface) -> SkylightResult<()> {
    let view = scene.view(id);
    match view.record().kind {
        LayerKind::Shape | LayerKind::Bitmap | LayerKind::Text => {
            surface.draw_layer(view.record(), view.local_frame())
        }
        // Containers have no content of their own.
        LayerKind::Group
        | LayerKind::Artboard
        | LayerKind::SymbolMaster
        | LayerKind::SymbolInstance { .. } => Ok(()),
    }
}

/// Renders children in paint order while threading the mask chain: a mask
/// clips exactly the following siblings up to the next mask or explicit
/// chain break. Invisible children are not drawn but still contribute
/// their clip when they are masks.
fn render_children(
    scene: &mut Scene,
    id: ViewId,
    surface: &mut dyn Surface,
) -> SkylightResult<()> {
    let children = scene.view(id).children().to_vec();
    let mut mask_checkpoint: Option<usize> = None;
    let mut result = Ok(());

    for child in children {
        let record = scene.view(child).record();
        let (is_mask, breaks_chain, visible) =
            (record.clipping_mask, record.break_mask_chain, record.visible);

        if (is_mask || breaks_chain)
            && let Some(checkpoint) = mask_checkpoint.take()
        {
            surface.restore_to(checkpoint);
        }

        if visible && let Err(err) = render_view(scene, child, surface) {
            result = Err(err);
            break;
        }

        if is_mask {
            let checkpoint = surface.save();
            surface.clip_rect(scene.clip_bounds(child));
            mask_checkpoint = Some(checkpoint);
        }
    }

    if let Some(checkpoint) = mask_checkpoint {
        surface.restore_to(checkpoint);
    }
    result
}
