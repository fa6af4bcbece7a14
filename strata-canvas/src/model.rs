//! Design-document model: pages of layers with fills and shadows.
//!
//! ```text
//! Page ── background: Fill | GradientFill      (fixed slot)
//!      ├─ layers: [Layer]                      (owned list)
//!      │     RectLayer ── fill: Fill           (fixed slot)
//!      │     TextLayer ── shadow: Shadow?      (replaceable)
//!      │     FrameLayer ─ children: [Layer]    (owned list)
//!      └─ selection ····> any layer            (back-reference)
//! ```

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use strata_model::{Model, ModelError, ObjectId, ObjectIndex, ObjectRef, Result, Scalar, TypeDescriptor};

/// Straight-alpha RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl Scalar for Color {}

/// Position and size on the page, in points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }
}

impl Scalar for Bounds {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
}

impl Scalar for BlendMode {}

/// Solid fill.
#[derive(Debug)]
pub struct Fill {
    pub color: Color,
    pub opacity: f32,
}

impl Fill {
    pub fn solid(color: Color) -> Self {
        Self { color, opacity: 1.0 }
    }
}

impl Default for Fill {
    fn default() -> Self {
        Fill::solid(Color::WHITE)
    }
}

impl Model for Fill {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<Fill>("Fill")
                .value("color", |f| &f.color, |f| &mut f.color)
                .value("opacity", |f| &f.opacity, |f| &mut f.opacity)
                .build()
        })
    }
}

/// Linear gradient; may stand in wherever a [`Fill`] is declared.
#[derive(Debug)]
pub struct GradientFill {
    pub color: Color,
    pub opacity: f32,
    pub stops: Vec<Color>,
    pub angle: f32,
}

impl GradientFill {
    pub fn new(stops: Vec<Color>, angle: f32) -> Self {
        Self {
            color: stops.first().copied().unwrap_or_default(),
            opacity: 1.0,
            stops,
            angle,
        }
    }
}

impl Default for GradientFill {
    fn default() -> Self {
        GradientFill::new(Vec::new(), 0.0)
    }
}

impl Model for GradientFill {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<GradientFill>("GradientFill")
                .extends(Fill::type_descriptor)
                .value("color", |f| &f.color, |f| &mut f.color)
                .value("opacity", |f| &f.opacity, |f| &mut f.opacity)
                .value_list("stops", |f| &f.stops, |f| &mut f.stops)
                .value("angle", |f| &f.angle, |f| &mut f.angle)
                .build()
        })
    }
}

#[derive(Debug, Default)]
pub struct Shadow {
    pub color: Color,
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Model for Shadow {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<Shadow>("Shadow")
                .value("color", |s| &s.color, |s| &mut s.color)
                .value("blur", |s| &s.blur, |s| &mut s.blur)
                .value("offset_x", |s| &s.offset_x, |s| &mut s.offset_x)
                .value("offset_y", |s| &s.offset_y, |s| &mut s.offset_y)
                .build()
        })
    }
}

/// Base of every layer type. Slots declared as `Layer` accept any of the
/// concrete layers below; a bare `Layer` is an empty placeholder.
#[derive(Debug, Default)]
pub struct Layer {
    pub name: String,
    pub bounds: Bounds,
    pub visible: bool,
    pub blend: BlendMode,
}

impl Model for Layer {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<Layer>("Layer")
                .value("name", |l| &l.name, |l| &mut l.name)
                .value("bounds", |l| &l.bounds, |l| &mut l.bounds)
                .value("visible", |l| &l.visible, |l| &mut l.visible)
                .value("blend", |l| &l.blend, |l| &mut l.blend)
                .build()
        })
    }
}

#[derive(Debug)]
pub struct RectLayer {
    pub name: String,
    pub bounds: Bounds,
    pub visible: bool,
    pub blend: BlendMode,
    pub corner_radius: f32,
    pub fill: ObjectRef,
}

impl RectLayer {
    pub fn new(name: &str, bounds: Bounds) -> Self {
        Self {
            name: name.to_string(),
            bounds,
            ..Self::default()
        }
    }
}

impl Default for RectLayer {
    fn default() -> Self {
        Self {
            name: String::new(),
            bounds: Bounds::default(),
            visible: true,
            blend: BlendMode::Normal,
            corner_radius: 0.0,
            fill: ObjectRef::new(Fill::default()),
        }
    }
}

impl Model for RectLayer {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<RectLayer>("RectLayer")
                .extends(Layer::type_descriptor)
                .value("name", |l| &l.name, |l| &mut l.name)
                .value("bounds", |l| &l.bounds, |l| &mut l.bounds)
                .value("visible", |l| &l.visible, |l| &mut l.visible)
                .value("blend", |l| &l.blend, |l| &mut l.blend)
                .value("corner_radius", |l| &l.corner_radius, |l| &mut l.corner_radius)
                .owned("fill", Fill::type_descriptor, |l| &l.fill, |l| &mut l.fill)
                .build()
        })
    }
}

#[derive(Debug)]
pub struct TextLayer {
    pub name: String,
    pub bounds: Bounds,
    pub visible: bool,
    pub blend: BlendMode,
    pub content: String,
    pub font_size: f32,
    pub color: Color,
    pub shadow: Option<ObjectRef>,
}

impl TextLayer {
    pub fn new(name: &str, bounds: Bounds, content: &str) -> Self {
        Self {
            name: name.to_string(),
            bounds,
            content: content.to_string(),
            ..Self::default()
        }
    }
}

impl Default for TextLayer {
    fn default() -> Self {
        Self {
            name: String::new(),
            bounds: Bounds::default(),
            visible: true,
            blend: BlendMode::Normal,
            content: String::new(),
            font_size: 14.0,
            color: Color::BLACK,
            shadow: None,
        }
    }
}

impl Model for TextLayer {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<TextLayer>("TextLayer")
                .extends(Layer::type_descriptor)
                .value("name", |l| &l.name, |l| &mut l.name)
                .value("bounds", |l| &l.bounds, |l| &mut l.bounds)
                .value("visible", |l| &l.visible, |l| &mut l.visible)
                .value("blend", |l| &l.blend, |l| &mut l.blend)
                .value("content", |l| &l.content, |l| &mut l.content)
                .value("font_size", |l| &l.font_size, |l| &mut l.font_size)
                .value("color", |l| &l.color, |l| &mut l.color)
                .owned_replaceable("shadow", Shadow::type_descriptor, |l| &l.shadow, |l| &mut l.shadow)
                .build()
        })
    }
}

/// Groups child layers; `clip` hides what falls outside its bounds.
#[derive(Debug)]
pub struct FrameLayer {
    pub name: String,
    pub bounds: Bounds,
    pub visible: bool,
    pub blend: BlendMode,
    pub clip: bool,
    pub children: Vec<ObjectRef>,
}

impl FrameLayer {
    pub fn new(name: &str, bounds: Bounds) -> Self {
        Self {
            name: name.to_string(),
            bounds,
            ..Self::default()
        }
    }
}

impl Default for FrameLayer {
    fn default() -> Self {
        Self {
            name: String::new(),
            bounds: Bounds::default(),
            visible: true,
            blend: BlendMode::Normal,
            clip: true,
            children: Vec::new(),
        }
    }
}

impl Model for FrameLayer {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<FrameLayer>("FrameLayer")
                .extends(Layer::type_descriptor)
                .value("name", |l| &l.name, |l| &mut l.name)
                .value("bounds", |l| &l.bounds, |l| &mut l.bounds)
                .value("visible", |l| &l.visible, |l| &mut l.visible)
                .value("blend", |l| &l.blend, |l| &mut l.blend)
                .value("clip", |l| &l.clip, |l| &mut l.clip)
                .owned_list("children", Layer::type_descriptor, |l| &l.children, |l| &mut l.children)
                .build()
        })
    }
}

/// Root of a design document.
#[derive(Debug)]
pub struct Page {
    pub name: String,
    pub guides: Vec<f32>,
    pub background: ObjectRef,
    pub layers: Vec<ObjectRef>,
    pub selection: Option<ObjectId>,
}

impl Page {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            name: String::new(),
            guides: Vec::new(),
            background: ObjectRef::new(Fill::default()),
            layers: Vec::new(),
            selection: None,
        }
    }
}

impl Model for Page {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::builder::<Page>("Page")
                .value("name", |p| &p.name, |p| &mut p.name)
                .value_list("guides", |p| &p.guides, |p| &mut p.guides)
                .owned("background", Fill::type_descriptor, |p| &p.background, |p| &mut p.background)
                .owned_list("layers", Layer::type_descriptor, |p| &p.layers, |p| &mut p.layers)
                .reference("selection", |p| &p.selection, |p| &mut p.selection)
                .build()
        })
    }

    /// A selection must point at a layer.
    fn after_load(&mut self, index: &ObjectIndex) -> Result<()> {
        if let Some(id) = self.selection {
            let target = index.require(id, "Page.selection")?;
            if !target.descriptor().is_a(Layer::type_descriptor()) {
                return Err(ModelError::format(
                    "Page.selection",
                    format!("{target:?} is not a layer"),
                ));
            }
        }
        Ok(())
    }
}

/// Name of any layer, whatever its concrete type.
pub fn layer_name(layer: &ObjectRef) -> Result<String> {
    if let Ok(l) = layer.read_as::<RectLayer>() {
        return Ok(l.name.clone());
    }
    if let Ok(l) = layer.read_as::<TextLayer>() {
        return Ok(l.name.clone());
    }
    if let Ok(l) = layer.read_as::<FrameLayer>() {
        return Ok(l.name.clone());
    }
    Ok(layer.read_as::<Layer>()?.name.clone())
}

/// Every layer on `page`, depth first, frames before their children.
pub fn walk_layers(page: &ObjectRef) -> Result<Vec<ObjectRef>> {
    let mut out = Vec::new();
    let mut stack: Vec<ObjectRef> = page.read_as::<Page>()?.layers.iter().rev().cloned().collect();
    while let Some(layer) = stack.pop() {
        if let Ok(frame) = layer.read_as::<FrameLayer>() {
            stack.extend(frame.children.iter().rev().cloned());
        }
        out.push(layer);
    }
    Ok(out)
}
