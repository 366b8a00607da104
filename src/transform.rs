use kurbo::{Affine, Point, Vec2};

/// Per-view transform state: a pivot-centered rotation/scale placed at a
/// position in the parent's space, plus the derived local and world
/// matrices.
///
/// The local matrix is `translate(position) * rotate(rotation) *
/// scale(scale) * translate(-pivot)`; the world matrix is the parent's
/// world matrix times the local one. Setters only record the component and
/// mark the local matrix stale; `update_local` must run before the matrix
/// is read.
#[derive(Clone, Debug)]
pub struct TransformNode {
    pivot: Point,
    position: Point,
    rotation: f64, // radians
    scale: Vec2,
    local: Affine,
    world: Affine,
    local_stale: bool,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self {
            pivot: Point::ORIGIN,
            position: Point::ORIGIN,
            rotation: 0.0,
            scale: Vec2::new(1.0, 1.0),
            local: Affine::IDENTITY,
            world: Affine::IDENTITY,
            local_stale: false,
        }
    }
}

impl TransformNode {
    pub fn set_pivot(&mut self, x: f64, y: f64) {
        self.pivot = Point::new(x, y);
        self.local_stale = true;
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.position = Point::new(x, y);
        self.local_stale = true;
    }

    pub fn set_scale(&mut self, x: f64, y: f64) {
        self.scale = Vec2::new(x, y);
        self.local_stale = true;
    }

    pub fn set_rotation(&mut self, radians: f64) {
        self.rotation = radians;
        self.local_stale = true;
    }

    pub fn pivot(&self) -> Point {
        self.pivot
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn update_local(&mut self) {
        self.local = Affine::translate(self.position.to_vec2())
            * Affine::rotate(self.rotation)
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
            * Affine::translate(-self.pivot.to_vec2());
        self.local_stale = false;
    }

    /// Composes this node's world matrix from its parent's. Pass
    /// `Affine::IDENTITY` for the root.
    pub fn update_world(&mut self, parent_world: Affine) {
        debug_assert!(!self.local_stale, "update_local must run before update_world");
        self.world = parent_world * self.local;
    }

    pub fn local(&self) -> Affine {
        self.local
    }

    pub fn world(&self) -> Affine {
        self.world
    }

    /// Maps a point from the parent's space into this node's local space,
    /// the exact inverse of the forward local matrix.
    pub fn apply_inverse(&self, point: Point) -> Point {
        self.local.inverse() * point
    }

    /// Maps a point from the root's space into this node's local space.
    pub fn apply_world_inverse(&self, point: Point) -> Point {
        self.world.inverse() * point
    }
}
