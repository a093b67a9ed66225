//! Contract of the component that paints viewports.

use hp_model::ViewportStructure;

use crate::assignment::ViewportBinding;

/// Receives layout changes and per-viewport bindings from the engine.
///
/// The engine makes no assumption about when or how painting happens.
pub trait RenderSurface {
    /// Switch to the layout of the active stage.
    fn set_layout(&mut self, structure: &ViewportStructure, viewport_count: usize);

    /// Show the bound study/series/instance, or an empty viewport when the
    /// binding is unbound. The binding also carries the viewport's display
    /// settings (window preset, invert, ...).
    fn set_viewport_data(&mut self, binding: &ViewportBinding);
}
