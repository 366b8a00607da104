//! Snap-constraint resolver for responsive symbol-instance resizing.
//!
//! When an instance (or any scaled container) renders at a size other than
//! its master's, each child derives a per-axis scale from its snap flags and
//! a new origin that preserves the anchored edges. Both steps work on one
//! axis at a time; X uses the left/right snaps, Y the top/bottom ones.

use kurbo::{Rect, Size};

use crate::model::ResizingConstraints;

/// One axis of a child frame relative to its container's master frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisSpan {
    pub origin: f64,
    pub len: f64,
}

/// Snap/fixed flags projected onto one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AxisConstraints {
    pub snap_leading: bool,
    pub snap_trailing: bool,
    pub fixed: bool,
}

impl ResizingConstraints {
    pub fn x_axis(&self) -> AxisConstraints {
        AxisConstraints {
            snap_leading: self.snap_left,
            snap_trailing: self.snap_right,
            fixed: self.fixed_width,
        }
    }

    pub fn y_axis(&self) -> AxisConstraints {
        AxisConstraints {
            snap_leading: self.snap_top,
            snap_trailing: self.snap_bottom,
            fixed: self.fixed_height,
        }
    }
}

pub fn x_span(r: Rect) -> AxisSpan {
    AxisSpan {
        origin: r.x0,
        len: r.width(),
    }
}

pub fn y_span(r: Rect) -> AxisSpan {
    AxisSpan {
        origin: r.y0,
        len: r.height(),
    }
}

// Zero-size denominators would push NaN into the transform; a degenerate
// axis keeps scale 1 instead.
fn guarded_ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        1.0
    } else {
        num / den
    }
}

/// Step 1: the child's scale factor along one axis.
///
/// A fixed axis never scales, regardless of snap flags. Otherwise: both
/// edges snapped stretches the child to keep both margins (tie-break is
/// "stretch", not "center"), a single snapped edge scales the remaining
/// run, and no snaps means plain proportional scaling.
pub fn axis_scale(instance_len: f64, master_len: f64, child: AxisSpan, c: AxisConstraints) -> f64 {
    let instance_scale = guarded_ratio(instance_len, master_len);
    if c.fixed {
        return 1.0;
    }

    if c.snap_leading && c.snap_trailing {
        guarded_ratio(instance_len - (master_len - child.len), child.len)
    } else if c.snap_trailing {
        let trailing_margin = master_len - child.len - child.origin;
        guarded_ratio(
            master_len * instance_scale - trailing_margin,
            master_len - trailing_margin,
        )
    } else if c.snap_leading {
        guarded_ratio(
            master_len * instance_scale - child.origin,
            master_len - child.origin,
        )
    } else {
        instance_scale
    }
}

/// Step 2: the child's new origin along one axis, given its already-scaled
/// length.
///
/// Snapped-both and snapped-leading keep the old origin; snapped-trailing
/// keeps the trailing margin; unsnapped children keep their proportional
/// center. Runs even when a fixed axis suppressed the scale override.
pub fn axis_offset(
    instance_len: f64,
    master_len: f64,
    old: AxisSpan,
    new_len: f64,
    c: AxisConstraints,
) -> f64 {
    if c.snap_leading && c.snap_trailing {
        old.origin
    } else if c.snap_trailing {
        let trailing_margin = master_len - old.len - old.origin;
        instance_len - new_len - trailing_margin
    } else if c.snap_leading {
        old.origin
    } else {
        let old_center = old.origin + old.len / 2.0;
        let ratio = if master_len == 0.0 {
            0.5
        } else {
            old_center / master_len
        };
        ratio * instance_len - new_len / 2.0
    }
}

/// Per-axis scale pair for a child of a resized container, or `None` when
/// the container renders at its master size and no override is needed.
pub fn child_scale(
    instance: Size,
    master: Size,
    child: Rect,
    c: &ResizingConstraints,
) -> Option<(f64, f64)> {
    if instance.width == master.width && instance.height == master.height {
        return None;
    }
    Some((
        axis_scale(instance.width, master.width, x_span(child), c.x_axis()),
        axis_scale(instance.height, master.height, y_span(child), c.y_axis()),
    ))
}

/// Composes both steps into the child's frame inside the resized container,
/// or `None` when the child keeps its intrinsic frame.
pub fn scaled_child_frame(
    instance: Size,
    master: Size,
    child: Rect,
    c: &ResizingConstraints,
) -> Option<Rect> {
    let (sx, sy) = child_scale(instance, master, child, c)?;
    let new_w = child.width() * sx;
    let new_h = child.height() * sy;
    let x = axis_offset(instance.width, master.width, x_span(child), new_w, c.x_axis());
    let y = axis_offset(
        instance.height,
        master.height,
        y_span(child),
        new_h,
        c.y_axis(),
    );
    Some(Rect::new(x, y, x + new_w, y + new_h))
}
