use std::collections::BTreeMap;

use kurbo::Rect;

use crate::error::{SkylightError, SkylightResult};

/// A parsed design document: one root layer plus the dictionary of symbol
/// masters that symbol instances reference by key.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub root: LayerRecord,
    #[serde(default)]
    pub symbols: BTreeMap<String, LayerRecord>, // stable keys
}

/// One immutable layer node as produced by the document parser. The scene
/// graph reads these; it never writes them back.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LayerRecord {
    pub name: String,
    pub kind: LayerKind,
    /// Origin and size in the parent's local space.
    pub frame: Rect,
    /// Degrees, counter-clockwise in unflipped coordinates.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    /// Clips following siblings until the next mask or chain break.
    #[serde(default)]
    pub clipping_mask: bool,
    /// Terminates an active sibling mask chain before this layer renders.
    #[serde(default)]
    pub break_mask_chain: bool,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub constraints: ResizingConstraints,
    #[serde(default)]
    pub children: Vec<LayerRecord>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LayerKind {
    Group,
    Shape,
    Bitmap,
    Text,
    Artboard,
    SymbolMaster,
    /// References a master in `Document::symbols`; the record's own frame is
    /// the instance frame, possibly resized away from the master's.
    SymbolInstance {
        symbol: String,
    },
}

impl LayerKind {
    /// Containers run the instance-scaling resolver over their children.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            LayerKind::Group
                | LayerKind::Artboard
                | LayerKind::SymbolMaster
                | LayerKind::SymbolInstance { .. }
        )
    }
}

/// Per-edge resize behavior under a scaling container. A snap flag pins the
/// child's distance to that container edge; fixed width/height pins the
/// child's size on that axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResizingConstraints {
    #[serde(default)]
    pub snap_left: bool,
    #[serde(default)]
    pub snap_right: bool,
    #[serde(default)]
    pub snap_top: bool,
    #[serde(default)]
    pub snap_bottom: bool,
    #[serde(default)]
    pub fixed_width: bool,
    #[serde(default)]
    pub fixed_height: bool,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Style {
    /// 0..=1; values below 1 force an isolated compositing layer.
    pub opacity: f64,
    pub blend: BlendMode,
    #[serde(default)]
    pub shadows: Vec<Shadow>,
    #[serde(default)]
    pub blur: Option<Blur>,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            blend: BlendMode::Normal,
            shadows: Vec::new(),
            blur: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Shadow {
    pub offset_x: f64,
    pub offset_y: f64,
    pub blur_radius: f64,
    #[serde(default)]
    pub spread: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Blur {
    pub kind: BlurKind,
    pub radius: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlurKind {
    Gaussian,
    Motion,
    Zoom,
    Background,
}

impl Document {
    pub fn validate(&self) -> SkylightResult<()> {
        for (key, master) in &self.symbols {
            if key.trim().is_empty() {
                return Err(SkylightError::validation("symbol key must be non-empty"));
            }
            if !matches!(master.kind, LayerKind::SymbolMaster) {
                return Err(SkylightError::validation(format!(
                    "symbol '{key}' must be a SymbolMaster, got {:?}",
                    master.kind
                )));
            }
        }

        let mut expanding = Vec::new();
        self.validate_layer(&self.root, &mut expanding)?;
        for master in self.symbols.values() {
            self.validate_layer(master, &mut expanding)?;
        }
        Ok(())
    }

    fn validate_layer<'a>(
        &'a self,
        layer: &'a LayerRecord,
        expanding: &mut Vec<&'a str>,
    ) -> SkylightResult<()> {
        if !layer.frame.x0.is_finite()
            || !layer.frame.y0.is_finite()
            || !layer.frame.x1.is_finite()
            || !layer.frame.y1.is_finite()
        {
            return Err(SkylightError::validation(format!(
                "layer '{}' has a non-finite frame",
                layer.name
            )));
        }
        if layer.frame.width() < 0.0 || layer.frame.height() < 0.0 {
            return Err(SkylightError::validation(format!(
                "layer '{}' has a negative-size frame",
                layer.name
            )));
        }
        if !layer.rotation.is_finite() {
            return Err(SkylightError::validation(format!(
                "layer '{}' has a non-finite rotation",
                layer.name
            )));
        }
        if !(0.0..=1.0).contains(&layer.style.opacity) {
            return Err(SkylightError::validation(format!(
                "layer '{}' opacity must be within 0..=1",
                layer.name
            )));
        }
        for shadow in &layer.style.shadows {
            if !shadow.offset_x.is_finite()
                || !shadow.offset_y.is_finite()
                || !shadow.blur_radius.is_finite()
                || shadow.blur_radius < 0.0
                || !shadow.spread.is_finite()
            {
                return Err(SkylightError::validation(format!(
                    "layer '{}' has an invalid shadow",
                    layer.name
                )));
            }
        }
        if let Some(blur) = &layer.style.blur
            && (!blur.radius.is_finite() || blur.radius < 0.0)
        {
            return Err(SkylightError::validation(format!(
                "layer '{}' blur radius must be finite and >= 0",
                layer.name
            )));
        }

        if let LayerKind::SymbolInstance { symbol } = &layer.kind {
            let Some(master) = self.symbols.get(symbol) else {
                return Err(SkylightError::validation(format!(
                    "instance '{}' references missing symbol key '{symbol}'",
                    layer.name
                )));
            };
            if expanding.iter().any(|k| k == symbol) {
                return Err(SkylightError::validation(format!(
                    "symbol '{symbol}' expands into itself"
                )));
            }
            expanding.push(symbol);
            self.validate_layer(master, expanding)?;
            expanding.pop();
        }

        for child in &layer.children {
            self.validate_layer(child, expanding)?;
        }
        Ok(())
    }
}
