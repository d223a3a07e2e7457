//! Data structures derived from a loaded asset.
//!
//! - `transform` holds the local TRS transformation of a node
//! - `scene_graph` flattens the node hierarchy into a parent table and resolves poses
//! - `skeleton` reads skins and turns joint world matrices into bone matrices
//! - `bone_texture` packs bone matrices into the float texture sampled by the particle shader

pub mod bone_texture;
pub mod scene_graph;
pub mod skeleton;
pub mod transform;
