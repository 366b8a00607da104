//! The layer view tree: a parallel, mutable scene graph over the immutable
//! document model.
//!
//! Views live in a slotmap arena; parents hold child ids in paint order and
//! children hold a parent id instead of a back-pointer. Layout is a
//! top-down pass that resolves instance scaling, rebuilds each stale local
//! transform, and refreshes every world transform. Derived geometry
//! (render frame, bounds) is memoized against a per-view generation
//! counter that every geometry-affecting mutation bumps.

use kurbo::{Affine, Point, Rect, Size};
use slotmap::SlotMap;

use crate::{
    error::SkylightResult,
    geom::map_rect_aabb,
    model::{Document, LayerKind, LayerRecord, Style},
    paint::{LayerPaint, PaintSlot, effect_padding, resolve_layer_paint},
    scaling::scaled_child_frame,
    transform::TransformNode,
};

slotmap::new_key_type! {
    /// Stable handle to a view in the scene arena.
    pub struct ViewId;
}

/// One scene-graph node, mirroring one document layer.
#[derive(Debug)]
pub struct LayerView {
    record: LayerRecord,
    /// The intrinsic (master) frame: the symbol master's frame for
    /// instances, the record's own frame otherwise.
    master_frame: Rect,
    parent: Option<ViewId>,
    children: Vec<ViewId>,
    transform: TransformNode,
    /// Present only while an ancestor's resize overrides the intrinsic
    /// frame.
    scaled_frame: Option<Rect>,
    paint: PaintSlot,
    layout_dirty: bool,
    transform_dirty: bool,
    generation: u64,
    geom: Option<GeomCache>,
}

#[derive(Clone, Copy, Debug)]
struct GeomCache {
    generation: u64,
    render_frame: Rect,
    bounds: Rect,
}

impl LayerView {
    pub fn record(&self) -> &LayerRecord {
        &self.record
    }

    /// The frame the view currently renders at, in parent-local space: the
    /// scaled override when an ancestor resized it, the intrinsic frame
    /// otherwise.
    pub fn frame(&self) -> Rect {
        self.scaled_frame.unwrap_or(self.record.frame)
    }

    /// The frame in the view's own space: the same size anchored at the
    /// origin. The local transform maps this box onto `frame` in the
    /// parent; drawing, bounds and hit containment all use it.
    pub fn local_frame(&self) -> Rect {
        self.frame().with_origin(Point::ORIGIN)
    }

    pub fn master_frame(&self) -> Rect {
        self.master_frame
    }

    pub fn scaled_frame(&self) -> Option<Rect> {
        self.scaled_frame
    }

    pub fn parent(&self) -> Option<ViewId> {
        self.parent
    }

    pub fn children(&self) -> &[ViewId] {
        &self.children
    }

    pub fn transform(&self) -> &TransformNode {
        &self.transform
    }

    /// Bumped by every mutation that can change derived geometry;
    /// downstream caches key on it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Visible and unlocked; the hit-test recursion filter.
    pub fn is_interactive(&self) -> bool {
        self.record.visible && !self.record.locked
    }
}

/// The scene graph for one document. Single-threaded: layout, render and
/// mutation all run on the owner's frame/interaction loop.
#[derive(Debug)]
pub struct Scene {
    views: SlotMap<ViewId, LayerView>,
    root: ViewId,
}

impl Scene {
    /// Materializes the view tree for a document. Symbol instances expand
    /// to their master's children, with the master's frame recorded as the
    /// instance's intrinsic frame.
    pub fn from_document(doc: &Document) -> SkylightResult<Self> {
        doc.validate()?;
        let mut views = SlotMap::with_key();
        let root = build_view(&mut views, doc, &doc.root, None)?;
        Ok(Self { views, root })
    }

    pub fn root(&self) -> ViewId {
        self.root
    }

    pub fn view(&self, id: ViewId) -> &LayerView {
        &self.views[id]
    }

    pub fn world_transform(&self, id: ViewId) -> Affine {
        self.views[id].transform.world()
    }

    // ----- layout phase -----

    /// Top-down layout: per node, resolve instance scaling if stale, then
    /// the local transform if stale, then refresh the world transform
    /// unconditionally (an ancestor may have moved even when this node did
    /// not), then recurse. Invisible children still lay out; they may act
    /// as masks.
    #[tracing::instrument(skip(self))]
    pub fn layout(&mut self) {
        self.layout_view(self.root);
    }

    fn layout_view(&mut self, id: ViewId) {
        if self.views[id].layout_dirty {
            self.layout_self(id);
            self.views[id].layout_dirty = false;
        }

        if self.views[id].transform_dirty {
            self.update_transform(id);
            self.views[id].transform_dirty = false;
        }

        let parent_world = match self.views[id].parent {
            Some(p) => self.views[p].transform.world(),
            None => Affine::IDENTITY,
        };
        self.views[id].transform.update_world(parent_world);

        for i in 0..self.views[id].children.len() {
            let child = self.views[id].children[i];
            self.layout_view(child);
        }
    }

    /// Containers propagate their resize to children: each child gets a
    /// scaled frame derived from its snap constraints against the
    /// (current, master) frame pair, or its intrinsic frame back when the
    /// container is at master size.
    fn layout_self(&mut self, id: ViewId) {
        if !self.views[id].record.kind.is_container() {
            return;
        }
        let instance: Size = self.views[id].frame().size();
        let master: Size = self.views[id].master_frame.size();

        for i in 0..self.views[id].children.len() {
            let child = self.views[id].children[i];
            let child_frame = self.views[child].record.frame;
            let constraints = self.views[child].record.constraints;
            let scaled = scaled_child_frame(instance, master, child_frame, &constraints);
            self.set_scaled_frame(child, scaled);
        }
    }

    fn update_transform(&mut self, id: ViewId) {
        let frame = self.views[id].frame();
        let center = frame.center();
        let v = &mut self.views[id];
        let sx: f64 = if v.record.flip_x { -1.0 } else { 1.0 };
        let sy: f64 = if v.record.flip_y { -1.0 } else { 1.0 };
        // The extra negation keeps the apparent rotation direction stable
        // under flips; treat the formula as a fixed contract.
        let rotation = -(sx * sy).signum() * v.record.rotation.to_radians();
        // Pivot is the frame's center in the view's own space; position
        // places that center in the parent, so the local matrix carries
        // the frame origin.
        v.transform
            .set_pivot(frame.width() / 2.0, frame.height() / 2.0);
        v.transform.set_position(center.x, center.y);
        v.transform.set_scale(sx, sy);
        v.transform.set_rotation(rotation);
        v.transform.update_local();
    }

    fn set_scaled_frame(&mut self, id: ViewId, frame: Option<Rect>) {
        let v = &mut self.views[id];
        if v.scaled_frame == frame {
            return;
        }
        v.scaled_frame = frame;
        v.generation += 1;
        v.transform_dirty = true;
        v.layout_dirty = true;
    }

    // ----- mutation -----

    /// Moves or resizes a view. For instances this changes the instance
    /// frame; the master frame stays with the symbol.
    pub fn set_frame(&mut self, id: ViewId, frame: Rect) {
        let v = &mut self.views[id];
        if v.record.frame == frame {
            return;
        }
        v.record.frame = frame;
        if !matches!(v.record.kind, LayerKind::SymbolInstance { .. }) {
            v.master_frame = frame;
        }
        v.generation += 1;
        v.transform_dirty = true;
        v.layout_dirty = true;
        // A scaled parent derives this child's override from its record
        // frame, so it must re-resolve.
        if let Some(parent) = self.views[id].parent {
            self.views[parent].layout_dirty = true;
        }
    }

    pub fn set_style(&mut self, id: ViewId, style: Style) {
        let v = &mut self.views[id];
        v.record.style = style;
        v.paint = PaintSlot::Unresolved;
        v.generation += 1; // effect padding may have changed
    }

    pub fn set_visible(&mut self, id: ViewId, visible: bool) {
        self.views[id].record.visible = visible;
    }

    // ----- derived geometry -----

    /// The view's local frame inflated by its effect padding (blur/shadow
    /// extents), used for bounding and reject tests. Memoized against the
    /// generation counter.
    pub fn render_frame(&mut self, id: ViewId) -> Rect {
        self.ensure_geom(id).render_frame
    }

    /// Axis-aligned enclosure of the render frame after the local
    /// transform, in parent space. Valid once `layout` has run.
    pub fn bounds(&mut self, id: ViewId) -> Rect {
        self.ensure_geom(id).bounds
    }

    /// The undecorated local frame mapped through the local transform, in
    /// parent space; what a mask contributes to the clip.
    pub fn clip_bounds(&self, id: ViewId) -> Rect {
        let v = &self.views[id];
        map_rect_aabb(v.transform.local(), v.local_frame())
    }

    fn ensure_geom(&mut self, id: ViewId) -> GeomCache {
        let v = &self.views[id];
        if let Some(geom) = v.geom
            && geom.generation == v.generation
        {
            return geom;
        }
        let padding = effect_padding(&v.record.style);
        let render_frame = v.local_frame().inflate(padding, padding);
        let geom = GeomCache {
            generation: v.generation,
            render_frame,
            bounds: map_rect_aabb(v.transform.local(), render_frame),
        };
        // A read between a mutation and the next layout sees the stale
        // local transform; memoizing it at the new generation would keep
        // serving it after layout. Cache only when the view is clean.
        if !v.layout_dirty && !v.transform_dirty {
            self.views[id].geom = Some(geom);
        }
        geom
    }

    pub(crate) fn resolve_paint(&mut self, id: ViewId) -> Option<LayerPaint> {
        match &self.views[id].paint {
            PaintSlot::Ready(paint) => Some(paint.clone()),
            PaintSlot::NotNeeded => None,
            PaintSlot::Unresolved => {
                let paint = resolve_layer_paint(&self.views[id].record.style);
                self.views[id].paint = match &paint {
                    Some(p) => PaintSlot::Ready(p.clone()),
                    None => PaintSlot::NotNeeded,
                };
                paint
            }
        }
    }

    // ----- hit-testing -----

    /// Innermost interactive view containing a point in root space.
    /// Children are tested in reverse paint order, so overlap resolves to
    /// the topmost-drawn sibling. Valid once `layout` has run.
    pub fn find_view(&self, point: Point) -> Option<ViewId> {
        self.find_from(self.root, point)
    }

    fn find_from(&self, id: ViewId, point: Point) -> Option<ViewId> {
        if !self.contains_point(id, point) {
            return None;
        }
        for &child in self.views[id].children.iter().rev() {
            if self.views[child].is_interactive()
                && let Some(hit) = self.find_from(child, point)
            {
                return Some(hit);
            }
        }
        Some(id)
    }

    /// Whether a point in root space falls inside this view's frame, via
    /// the inverse of its world transform.
    pub fn contains_point(&self, id: ViewId, point: Point) -> bool {
        let v = &self.views[id];
        let local = v.transform.apply_world_inverse(point);
        v.local_frame().contains(local)
    }
}

fn build_view(
    views: &mut SlotMap<ViewId, LayerView>,
    doc: &Document,
    record: &LayerRecord,
    parent: Option<ViewId>,
) -> SkylightResult<ViewId> {
    let (master_frame, child_records) = match &record.kind {
        LayerKind::SymbolInstance { symbol } => {
            // Present after validation; build order keeps this fallible.
            let master = doc.symbols.get(symbol).ok_or_else(|| {
                crate::error::SkylightError::validation(format!(
                    "instance '{}' references missing symbol key '{symbol}'",
                    record.name
                ))
            })?;
            (master.frame, &master.children)
        }
        _ => (record.frame, &record.children),
    };

    let mut flat = record.clone();
    flat.children = Vec::new();

    let id = views.insert(LayerView {
        record: flat,
        master_frame,
        parent,
        children: Vec::new(),
        transform: TransformNode::default(),
        scaled_frame: None,
        paint: PaintSlot::Unresolved,
        layout_dirty: true,
        transform_dirty: true,
        generation: 0,
        geom: None,
    });

    for child in child_records {
        let child_id = build_view(views, doc, child, Some(id))?;
        views[id].children.push(child_id);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{Blur, BlurKind, ResizingConstraints};

    fn layer(name: &str, kind: LayerKind, frame: Rect) -> LayerRecord {
        LayerRecord {
            name: name.to_string(),
            kind,
            frame,
            rotation: 0.0,
            flip_x: false,
            flip_y: false,
            visible: true,
            locked: false,
            clipping_mask: false,
            break_mask_chain: false,
            style: Style::default(),
            constraints: ResizingConstraints::default(),
            children: Vec::new(),
        }
    }

    fn doc_with_root(root: LayerRecord) -> Document {
        Document {
            root,
            symbols: BTreeMap::new(),
        }
    }

    fn scene_with_root(root: LayerRecord) -> Scene {
        Scene::from_document(&doc_with_root(root)).unwrap()
    }

    #[test]
    fn pivot_and_position_track_the_frame_center() {
        let mut scene = scene_with_root(layer(
            "r",
            LayerKind::Group,
            Rect::new(10.0, 20.0, 110.0, 70.0),
        ));
        scene.layout();
        let t = scene.view(scene.root()).transform();
        assert_eq!(t.pivot(), Point::new(50.0, 25.0));
        assert_eq!(t.position(), Point::new(60.0, 45.0));
        // Net effect for an unrotated layer: translate by the frame origin.
        assert_eq!(t.local() * Point::ORIGIN, Point::new(10.0, 20.0));
    }

    #[test]
    fn instance_children_get_scaled_frames() {
        let mut master = layer(
            "button",
            LayerKind::SymbolMaster,
            Rect::new(0.0, 0.0, 100.0, 40.0),
        );
        let mut bg = layer("bg", LayerKind::Shape, Rect::new(10.0, 0.0, 90.0, 40.0));
        bg.constraints = ResizingConstraints {
            snap_left: true,
            snap_right: true,
            ..Default::default()
        };
        master.children.push(bg);

        let mut root = layer("page", LayerKind::Group, Rect::new(0.0, 0.0, 800.0, 600.0));
        root.children.push(layer(
            "cta",
            LayerKind::SymbolInstance {
                symbol: "button".to_string(),
            },
            Rect::new(0.0, 0.0, 140.0, 40.0),
        ));

        let mut symbols = BTreeMap::new();
        symbols.insert("button".to_string(), master);
        let mut scene = Scene::from_document(&Document { root, symbols }).unwrap();
        scene.layout();

        let instance = scene.view(scene.root()).children()[0];
        let bg = scene.view(instance).children()[0];
        let scaled = scene.view(bg).scaled_frame().unwrap();
        assert_eq!(scaled.x0, 10.0);
        assert_eq!(scaled.width(), 120.0);
    }

    #[test]
    fn instance_at_master_size_leaves_children_intrinsic() {
        let mut master = layer(
            "card",
            LayerKind::SymbolMaster,
            Rect::new(0.0, 0.0, 100.0, 40.0),
        );
        master
            .children
            .push(layer("bg", LayerKind::Shape, Rect::new(5.0, 5.0, 95.0, 35.0)));

        let mut root = layer("page", LayerKind::Group, Rect::new(0.0, 0.0, 800.0, 600.0));
        root.children.push(layer(
            "c1",
            LayerKind::SymbolInstance {
                symbol: "card".to_string(),
            },
            Rect::new(20.0, 20.0, 120.0, 60.0),
        ));

        let mut symbols = BTreeMap::new();
        symbols.insert("card".to_string(), master);
        let mut scene = Scene::from_document(&Document { root, symbols }).unwrap();
        scene.layout();

        let instance = scene.view(scene.root()).children()[0];
        let bg = scene.view(instance).children()[0];
        assert_eq!(scene.view(bg).scaled_frame(), None);
    }

    #[test]
    fn resizing_an_instance_relayouts_children() {
        let mut master = layer(
            "badge",
            LayerKind::SymbolMaster,
            Rect::new(0.0, 0.0, 100.0, 100.0),
        );
        master
            .children
            .push(layer("dot", LayerKind::Shape, Rect::new(20.0, 20.0, 60.0, 60.0)));

        let mut root = layer("page", LayerKind::Group, Rect::new(0.0, 0.0, 800.0, 600.0));
        root.children.push(layer(
            "b1",
            LayerKind::SymbolInstance {
                symbol: "badge".to_string(),
            },
            Rect::new(0.0, 0.0, 100.0, 100.0),
        ));

        let mut symbols = BTreeMap::new();
        symbols.insert("badge".to_string(), master);
        let mut scene = Scene::from_document(&Document { root, symbols }).unwrap();
        scene.layout();

        let instance = scene.view(scene.root()).children()[0];
        let dot = scene.view(instance).children()[0];
        assert_eq!(scene.view(dot).scaled_frame(), None);

        scene.set_frame(instance, Rect::new(0.0, 0.0, 200.0, 100.0));
        scene.layout();
        let scaled = scene.view(dot).scaled_frame().unwrap();
        // No snaps: proportional width (40 * 2), preserved proportional
        // center (old center 40, ratio 0.4, new center 80).
        assert_eq!(scaled.width(), 80.0);
        assert_eq!(scaled.x0, 40.0);
    }

    #[test]
    fn world_transform_refreshes_when_only_an_ancestor_moves() {
        let mut inner = layer("inner", LayerKind::Group, Rect::new(0.0, 0.0, 10.0, 10.0));
        inner
            .children
            .push(layer("leaf", LayerKind::Shape, Rect::new(0.0, 0.0, 10.0, 10.0)));
        let mut root = layer("root", LayerKind::Group, Rect::new(0.0, 0.0, 100.0, 100.0));
        root.rotation = 45.0;
        root.children.push(inner);

        let mut scene = scene_with_root(root);
        scene.layout();
        let group = scene.view(scene.root()).children()[0];
        let leaf = scene.view(group).children()[0];
        let before = scene.world_transform(leaf);

        // Moving the rotated root shifts its pivot, so every descendant's
        // world transform must refresh even though their own local
        // transforms stayed clean.
        scene.set_frame(scene.root(), Rect::new(50.0, 0.0, 150.0, 100.0));
        scene.layout();
        let after = scene.world_transform(leaf);
        assert_ne!(before, after);
    }

    #[test]
    fn bounds_recompute_exactly_once_per_generation() {
        let mut root = layer("root", LayerKind::Shape, Rect::new(0.0, 0.0, 100.0, 50.0));
        root.style.blur = Some(Blur {
            kind: BlurKind::Gaussian,
            radius: 8.0,
        });
        let mut scene = scene_with_root(root);
        scene.layout();
        let id = scene.root();

        let first = scene.bounds(id);
        let cached_at = scene.views[id].geom.unwrap().generation;
        let second = scene.bounds(id);
        assert_eq!(first, second);
        assert_eq!(scene.views[id].geom.unwrap().generation, cached_at);
        assert_eq!(cached_at, scene.view(id).generation());

        // Render frame inflated by 3 * sigma = 12 on each side.
        assert_eq!(scene.render_frame(id), Rect::new(-12.0, -12.0, 112.0, 62.0));

        scene.set_frame(id, Rect::new(0.0, 0.0, 200.0, 50.0));
        scene.layout();
        let third = scene.bounds(id);
        assert_ne!(first, third);
        assert!(scene.views[id].geom.unwrap().generation > cached_at);
    }

    #[test]
    fn bounds_read_between_mutation_and_layout_does_not_stick() {
        let mut scene = scene_with_root(layer(
            "root",
            LayerKind::Shape,
            Rect::new(0.0, 0.0, 100.0, 50.0),
        ));
        scene.layout();
        let id = scene.root();
        assert_eq!(scene.bounds(id), Rect::new(0.0, 0.0, 100.0, 50.0));

        scene.set_frame(id, Rect::new(50.0, 0.0, 150.0, 50.0));
        // Pre-layout read: computed against the old local transform. It
        // must not be memoized at the new generation.
        let _ = scene.bounds(id);
        scene.layout();
        assert_eq!(scene.bounds(id), Rect::new(50.0, 0.0, 150.0, 50.0));
    }

    #[test]
    fn hit_test_prefers_topmost_sibling() {
        let mut root = layer("root", LayerKind::Group, Rect::new(0.0, 0.0, 100.0, 100.0));
        root.children
            .push(layer("below", LayerKind::Shape, Rect::new(0.0, 0.0, 60.0, 60.0)));
        root.children
            .push(layer("above", LayerKind::Shape, Rect::new(30.0, 30.0, 90.0, 90.0)));
        let mut scene = scene_with_root(root);
        scene.layout();

        let below = scene.view(scene.root()).children()[0];
        let above = scene.view(scene.root()).children()[1];
        assert_eq!(scene.find_view(Point::new(40.0, 40.0)), Some(above));
        assert_eq!(scene.find_view(Point::new(10.0, 10.0)), Some(below));
    }

    #[test]
    fn hit_test_skips_locked_and_invisible() {
        let mut root = layer("root", LayerKind::Group, Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut locked = layer("locked", LayerKind::Shape, Rect::new(0.0, 0.0, 50.0, 50.0));
        locked.locked = true;
        let mut hidden = layer("hidden", LayerKind::Shape, Rect::new(0.0, 0.0, 50.0, 50.0));
        hidden.visible = false;
        root.children.push(locked);
        root.children.push(hidden);
        let mut scene = scene_with_root(root);
        scene.layout();

        // Neither child is interactive, so the containing group wins.
        assert_eq!(scene.find_view(Point::new(10.0, 10.0)), Some(scene.root()));
    }

    #[test]
    fn hit_test_misses_outside_root() {
        let mut scene = scene_with_root(layer(
            "root",
            LayerKind::Group,
            Rect::new(0.0, 0.0, 100.0, 100.0),
        ));
        scene.layout();
        assert_eq!(scene.find_view(Point::new(500.0, 500.0)), None);
    }

    #[test]
    fn contains_point_respects_rotation() {
        let mut root = layer("root", LayerKind::Shape, Rect::new(0.0, 0.0, 100.0, 20.0));
        root.rotation = 90.0;
        let mut scene = scene_with_root(root);
        scene.layout();
        let id = scene.root();
        // Rotated about the center (50, 10): the frame now spans roughly
        // x in [40, 60], y in [-40, 60].
        assert!(scene.contains_point(id, Point::new(50.0, -30.0)));
        assert!(!scene.contains_point(id, Point::new(90.0, 10.0)));
    }

    #[test]
    fn flip_negates_apparent_rotation_direction() {
        let mut plain = layer("a", LayerKind::Shape, Rect::new(0.0, 0.0, 10.0, 10.0));
        plain.rotation = 30.0;
        let mut scene = scene_with_root(plain);
        scene.layout();
        let unflipped = scene.view(scene.root()).transform().rotation();

        let mut flipped = layer("b", LayerKind::Shape, Rect::new(0.0, 0.0, 10.0, 10.0));
        flipped.rotation = 30.0;
        flipped.flip_x = true;
        let mut scene = scene_with_root(flipped);
        scene.layout();
        let x_flipped = scene.view(scene.root()).transform().rotation();
        assert_eq!(unflipped, -x_flipped);

        let mut both = layer("c", LayerKind::Shape, Rect::new(0.0, 0.0, 10.0, 10.0));
        both.rotation = 30.0;
        both.flip_x = true;
        both.flip_y = true;
        let mut scene = scene_with_root(both);
        scene.layout();
        let both_flipped = scene.view(scene.root()).transform().rotation();
        assert_eq!(unflipped, both_flipped);
    }

    #[test]
    fn set_style_invalidates_paint_and_geometry() {
        let mut scene = scene_with_root(layer(
            "root",
            LayerKind::Shape,
            Rect::new(0.0, 0.0, 100.0, 50.0),
        ));
        scene.layout();
        let id = scene.root();
        assert_eq!(scene.resolve_paint(id), None);
        assert_eq!(scene.views[id].paint, PaintSlot::NotNeeded);
        let gen_before = scene.view(id).generation();

        scene.set_style(
            id,
            Style {
                opacity: 0.5,
                ..Default::default()
            },
        );
        assert_eq!(scene.views[id].paint, PaintSlot::Unresolved);
        assert!(scene.view(id).generation() > gen_before);
        let paint = scene.resolve_paint(id).unwrap();
        assert_eq!(paint.alpha, 0.5);
    }
}
