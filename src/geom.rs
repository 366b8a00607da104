use kurbo::{Affine, Point, Rect};

/// The four corners of a rectangle in clockwise order from the origin corner.
pub fn rect_corners(r: Rect) -> [Point; 4] {
    [
        Point::new(r.x0, r.y0),
        Point::new(r.x1, r.y0),
        Point::new(r.x1, r.y1),
        Point::new(r.x0, r.y1),
    ]
}

/// Axis-aligned bounding box of a rectangle mapped through an affine
/// transform: map the four corners, take their hull.
pub fn map_rect_aabb(t: Affine, r: Rect) -> Rect {
    let corners = rect_corners(r).map(|p| t * p);
    let mut out = Rect::from_points(corners[0], corners[1]);
    out = out.union_pt(corners[2]);
    out.union_pt(corners[3])
}
