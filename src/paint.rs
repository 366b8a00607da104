use crate::model::{BlendMode, BlurKind, Shadow, Style};

/// Composited paint state for one layer, handed to the surface when the
/// layer needs an isolated compositing layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerPaint {
    pub alpha: f64,
    pub blend: BlendMode,
    pub shadow: Option<Shadow>,
    /// Gaussian sigma; unsupported blur kinds never reach here.
    pub blur_sigma: Option<f64>,
}

/// Tri-state cache slot for a view's resolved paint. `Unresolved` must be
/// settled to one of the other two before the view renders.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum PaintSlot {
    #[default]
    Unresolved,
    NotNeeded,
    Ready(LayerPaint),
}

/// Derives the layer paint from a style block, or `None` when the style
/// requires no isolated layer (full opacity, normal blend, no effects).
///
/// Motion, zoom and background blurs are not implemented by any backend
/// yet; they degrade to "no blur" with a warning rather than failing the
/// render.
pub fn resolve_layer_paint(style: &Style) -> Option<LayerPaint> {
    let alpha = style.opacity.clamp(0.0, 1.0);

    let blur_sigma = match &style.blur {
        Some(blur) if blur.radius > 0.0 => match blur.kind {
            BlurKind::Gaussian => Some(blur.radius / 2.0),
            BlurKind::Motion | BlurKind::Zoom | BlurKind::Background => {
                tracing::warn!(kind = ?blur.kind, "unsupported blur kind, rendering without it");
                None
            }
        },
        _ => None,
    };

    let shadow = style.shadows.first().copied();

    if alpha >= 1.0 && style.blend == BlendMode::Normal && shadow.is_none() && blur_sigma.is_none()
    {
        return None;
    }

    Some(LayerPaint {
        alpha,
        blend: style.blend,
        shadow,
        blur_sigma,
    })
}

/// How far a layer's visual effects extend past its frame. Feeds the
/// render-frame inflation used for bounding and quick-reject tests.
///
/// Only the gaussian blur inflates (3 sigma covers the visible falloff);
/// every shadow in the list contributes even though only the first one is
/// baked into the paint.
pub fn effect_padding(style: &Style) -> f64 {
    let mut padding: f64 = 0.0;

    if let Some(blur) = &style.blur
        && blur.kind == BlurKind::Gaussian
        && blur.radius > 0.0
    {
        padding = padding.max(blur.radius / 2.0 * 3.0);
    }

    for shadow in &style.shadows {
        let reach = shadow.offset_x.abs().max(shadow.offset_y.abs())
            + shadow.blur_radius
            + shadow.spread.max(0.0);
        padding = padding.max(reach);
    }

    padding
}
