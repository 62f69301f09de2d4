pub mod brush;
pub mod canvas_ops;
pub mod effects;
pub mod filters;
pub mod transform;
