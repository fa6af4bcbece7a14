//! # strata-canvas: Sample design-document model on strata-model
//!
//! Pages of rectangles, text and frames, with polymorphic fills, optional
//! shadows and a selection back-reference. Everything here is plain model
//! code: the property tables in [`model`] are all that persistence and undo
//! need.
//!
//! ## Modules
//!
//! - [`model`]: the model types and their descriptors
//! - [`demo`]: a demo page and a scripted editing session

pub mod demo;
pub mod model;

pub use model::{
    layer_name, walk_layers, BlendMode, Bounds, Color, Fill, FrameLayer, GradientFill, Layer, Page,
    RectLayer, Shadow, TextLayer,
};

use strata_model::{Result, TypeRegistry};

/// Registry of every type a canvas document may contain.
pub fn canvas_registry() -> Result<TypeRegistry> {
    TypeRegistry::builder()
        .register::<Page>()
        .register::<Fill>()
        .register::<GradientFill>()
        .register::<Shadow>()
        .register::<Layer>()
        .register::<RectLayer>()
        .register::<TextLayer>()
        .register::<FrameLayer>()
        .build()
}
