//! Joints of a glTF skin and the bone matrices derived from them.

use cgmath::SquareMatrix;

use crate::data_structures::scene_graph::NodeTree;

#[derive(Clone, Debug)]
pub struct Skeleton {
    pub joints: Vec<usize>,
    pub joint_names: Vec<String>,
    pub inverse_bind_matrices: Vec<cgmath::Matrix4<f32>>,
}

impl Skeleton {
    /**
     * Reads the joint list and inverse bind matrices of `skin`.
     *
     * A skin without `inverseBindMatrices` is bound with identity matrices,
     * as the glTF specification prescribes.
     */
    pub fn from_skin(skin: &gltf::Skin, buffers: &[gltf::buffer::Data], tree: &NodeTree) -> Self {
        let joints: Vec<usize> = skin.joints().map(|joint| joint.index()).collect();
        let joint_names = joints
            .iter()
            .map(|&joint| tree.names.get(joint).cloned().unwrap_or_default())
            .collect();
        let reader = skin.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
        let mut inverse_bind_matrices: Vec<cgmath::Matrix4<f32>> = reader
            .read_inverse_bind_matrices()
            .map(|matrices| matrices.map(cgmath::Matrix4::from).collect())
            .unwrap_or_default();
        if inverse_bind_matrices.len() < joints.len() {
            if !inverse_bind_matrices.is_empty() {
                log::warn!(
                    "skin {} has {} joints but only {} inverse bind matrices, padding with identity",
                    skin.index(),
                    joints.len(),
                    inverse_bind_matrices.len()
                );
            }
            inverse_bind_matrices.resize(joints.len(), cgmath::Matrix4::identity());
        }
        Self {
            joints,
            joint_names,
            inverse_bind_matrices,
        }
    }

    pub fn bone_count(&self) -> usize {
        self.joints.len()
    }

    /// Bone matrix `i` is `world(joint_i) * inverse_bind_i`.
    pub fn bone_matrices(&self, world: &[cgmath::Matrix4<f32>]) -> Vec<cgmath::Matrix4<f32>> {
        self.joints
            .iter()
            .zip(self.inverse_bind_matrices.iter())
            .map(|(&joint, inverse_bind)| {
                let joint_world = world
                    .get(joint)
                    .copied()
                    .unwrap_or_else(cgmath::Matrix4::identity);
                joint_world * *inverse_bind
            })
            .collect()
    }
}
