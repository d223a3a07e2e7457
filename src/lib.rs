//! skinscope
//!
//! Tooling around skinned glTF assets: a read-only inspector that reports
//! meshes, rigs, animation clips and blend shapes, and the pieces needed to
//! skin a particle cloud on the GPU from a bone texture instead of moving
//! every particle on the CPU each frame.
//!
//! High-level modules
//! - `context`: headless GPU device and texture readback
//! - `data_structures`: node transforms, hierarchy, skeletons and bone textures
//! - `inspect`: statistics gathered from a loaded asset
//! - `pipelines`: the particle skinning shader, its GPU resources and pipeline
//! - `report`: plain-text rendering of inspection results
//! - `resources`: asset loading and animation clips
//! - `skinning`: per-particle skinning attributes and the CPU reference math
//!

pub mod context;
pub mod data_structures;
pub mod inspect;
pub mod pipelines;
pub mod report;
pub mod resources;
pub mod skinning;

// Re-exports commonly used types for convenience in downstream code.
pub use inspect::{InspectOptions, ModelReport, ModelSummary, SingleReport};
pub use resources::{GltfAsset, load_asset, load_asset_from_slice};
