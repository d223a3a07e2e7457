//! Render pipeline definitions.
//!
//! - `particles`: the particle cloud skinned on the GPU from a bone texture

pub mod particles;

/**
 * As we store vertex data directly in GPU memory we need to tell wgpu what
 * the bytes refer to. Implementors describe one vertex buffer slot.
 */
pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}
