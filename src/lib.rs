#![forbid(unsafe_code)]

pub mod error;
pub mod geom;
pub mod model;
pub mod paint;
pub mod render;
pub mod scaling;
pub mod surface;
pub mod transform;
pub mod view;

pub use error::{SkylightError, SkylightResult};
pub use model::{
    BlendMode, Blur, BlurKind, Document, LayerKind, LayerRecord, ResizingConstraints, Shadow,
    Style,
};
pub use paint::{LayerPaint, PaintSlot};
pub use render::render;
pub use surface::{RecordingSurface, Surface, SurfaceOp};
pub use transform::TransformNode;
pub use view::{LayerView, Scene, ViewId};
