//! Per-particle skinning data and the CPU reference of the GPU skinning math.
//!
//! A particle cloud is seeded from the vertices of a skinned mesh: each
//! particle remembers the vertex it sits on and optionally a neighbouring
//! vertex it is interpolated towards (particles spread along edges).
//! [`prepare_particle_attributes`] copies the skin indices, skin weights
//! and rest positions of both vertices into per-particle vertex data so
//! that the vertex shader can skin every particle from the bone texture
//! alone, with no per-frame work on the CPU besides posing the skeleton.

use anyhow::{Context, bail};
use cgmath::{EuclideanSpace, SquareMatrix, VectorSpace};

use crate::{
    data_structures::{
        bone_texture::BoneTexture,
        scene_graph::{NodeTree, Pose},
        skeleton::Skeleton,
    },
    resources::{
        GltfAsset,
        animation::{AnimationClip, read_animations},
    },
};

/// Vertex data of the skinned mesh particles are seeded from.
#[derive(Clone, Debug)]
pub struct SkinnedMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub joints: Option<Vec<[u16; 4]>>,
    pub weights: Option<Vec<[f32; 4]>>,
    pub skeleton: Option<Skeleton>,
    pub tree: NodeTree,
    pub mesh_node: usize,
    /// World matrix of the mesh node at bind time.
    pub bind_matrix: cgmath::Matrix4<f32>,
    pub bind_matrix_inverse: cgmath::Matrix4<f32>,
    pub animations: Vec<AnimationClip>,
}

fn read_weights(weights: gltf::mesh::util::ReadWeights<'_>) -> Vec<[f32; 4]> {
    match weights {
        gltf::mesh::util::ReadWeights::F32(it) => it.collect(),
        gltf::mesh::util::ReadWeights::U16(it) => it
            .map(|v| v.map(|w| w as f32 / u16::MAX as f32))
            .collect(),
        gltf::mesh::util::ReadWeights::U8(it) => {
            it.map(|v| v.map(|w| w as f32 / u8::MAX as f32)).collect()
        }
    }
}

fn read_joints(joints: gltf::mesh::util::ReadJoints<'_>) -> Vec<[u16; 4]> {
    match joints {
        gltf::mesh::util::ReadJoints::U16(it) => it.collect(),
        gltf::mesh::util::ReadJoints::U8(it) => it.map(|v| v.map(u16::from)).collect(),
    }
}

impl SkinnedMesh {
    /**
     * Picks the mesh particles are seeded from.
     *
     * Prefers the skinned mesh node with the most vertices. Without any
     * skinned node the first mesh node is used and the result carries no
     * skinning attributes, which disables GPU skinning downstream.
     */
    pub fn from_asset(asset: &GltfAsset) -> anyhow::Result<Self> {
        let document = &asset.document;
        let vertex_total = |mesh: &gltf::Mesh| -> usize {
            mesh.primitives()
                .filter_map(|primitive| primitive.get(&gltf::Semantic::Positions))
                .map(|positions| positions.count())
                .sum()
        };
        let node = document
            .nodes()
            .filter(|node| node.skin().is_some())
            .filter_map(|node| node.mesh().map(|mesh| (vertex_total(&mesh), node)))
            .max_by_key(|(vertices, _)| *vertices)
            .map(|(_, node)| node)
            .or_else(|| document.nodes().find(|node| node.mesh().is_some()))
            .with_context(|| format!("{} contains no mesh node", asset.name))?;
        let mesh = node
            .mesh()
            .with_context(|| format!("node {} lost its mesh", node.index()))?;

        let mut positions = Vec::new();
        let mut joints = Vec::new();
        let mut weights = Vec::new();
        let mut complete_skin = true;
        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| asset.buffer(buffer));
            let Some(primitive_positions) = reader.read_positions() else {
                continue;
            };
            let primitive_positions: Vec<[f32; 3]> = primitive_positions.collect();
            match (reader.read_joints(0), reader.read_weights(0)) {
                (Some(j), Some(w)) => {
                    joints.extend(read_joints(j));
                    weights.extend(read_weights(w));
                }
                _ => complete_skin = false,
            }
            positions.extend(primitive_positions);
        }
        let has_skin = complete_skin
            && node.skin().is_some()
            && joints.len() == positions.len()
            && weights.len() == positions.len();

        let tree = NodeTree::from_document(document);
        let skeleton = node
            .skin()
            .map(|skin| Skeleton::from_skin(&skin, &asset.buffers, &tree));
        let world = tree.world_matrices(&tree.rest_pose());
        let bind_matrix = world[node.index()];
        let bind_matrix_inverse = bind_matrix.invert().unwrap_or_else(|| {
            log::warn!(
                "mesh node {} has a singular world matrix, binding with identity",
                node.index()
            );
            cgmath::Matrix4::identity()
        });

        log::info!(
            "seeding from mesh {:?} on node {} ({} vertices, skinned: {})",
            mesh.name().unwrap_or("unnamed"),
            node.index(),
            positions.len(),
            has_skin
        );

        Ok(Self {
            name: mesh.name().unwrap_or("unnamed").to_string(),
            positions,
            joints: has_skin.then_some(joints),
            weights: has_skin.then_some(weights),
            skeleton,
            tree,
            mesh_node: node.index(),
            bind_matrix,
            bind_matrix_inverse,
            animations: read_animations(document, &asset.buffers),
        })
    }

    pub fn has_skinning(&self) -> bool {
        self.joints.is_some() && self.weights.is_some() && self.skeleton.is_some()
    }

    /// Bone matrices of the skeleton in `pose`; empty when the mesh has no skin.
    pub fn bone_matrices(&self, pose: &Pose) -> Vec<cgmath::Matrix4<f32>> {
        let world = self.tree.world_matrices(pose);
        self.skeleton
            .as_ref()
            .map(|skeleton| skeleton.bone_matrices(&world))
            .unwrap_or_default()
    }

    pub fn bone_texture(&self, pose: &Pose) -> BoneTexture {
        BoneTexture::from_matrices(&self.bone_matrices(pose))
    }

    pub fn find_animation(&self, name: &str) -> Option<&AnimationClip> {
        self.animations.iter().find(|clip| clip.name == name)
    }
}

/// Where one particle sits on the source mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSeed {
    pub vertex_index: u32,
    /// Vertex the particle is interpolated towards; `None` pins it to `vertex_index`.
    pub neighbor_index: Option<u32>,
    /// Position along the edge, 0 at `vertex_index`, 1 at `neighbor_index`.
    pub edge_t: f32,
}

impl ParticleSeed {
    pub fn on_vertex(vertex_index: u32) -> Self {
        Self {
            vertex_index,
            neighbor_index: None,
            edge_t: 0.0,
        }
    }

    pub fn on_edge(vertex_index: u32, neighbor_index: u32, edge_t: f32) -> Self {
        Self {
            vertex_index,
            neighbor_index: Some(neighbor_index),
            edge_t,
        }
    }
}

/// Skinning attributes of one particle, laid out as the vertex shader reads them.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleSkinVertex {
    pub skin_index: [u32; 4],
    pub skin_weight: [f32; 4],
    pub rest_position: [f32; 3],
    pub edge_factor: f32,
    pub neighbor_skin_index: [u32; 4],
    pub neighbor_skin_weight: [f32; 4],
    pub neighbor_rest_position: [f32; 3],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticleSkinAttributes {
    pub vertices: Vec<ParticleSkinVertex>,
}

impl ParticleSkinAttributes {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /**
     * Skins every particle on the CPU the way the vertex shader does: both
     * endpoints are skinned, mixed by the edge factor and normalised. Bone
     * lookups go through [`BoneTexture::bone_matrix`], so indices past the
     * bone count read the same padding texels the shader does.
     *
     * Used for the non-GPU fallback positions and to verify the shader path.
     */
    pub fn skin_on_cpu(
        &self,
        bones: &BoneTexture,
        bind_matrix: &cgmath::Matrix4<f32>,
        bind_matrix_inverse: &cgmath::Matrix4<f32>,
        norm: &NormParams,
    ) -> Vec<[f32; 3]> {
        self.vertices
            .iter()
            .map(|vertex| {
                let p1 = apply_bone_transform(
                    vertex.rest_position.into(),
                    vertex.skin_index,
                    vertex.skin_weight,
                    bones,
                    bind_matrix,
                    bind_matrix_inverse,
                );
                let p2 = apply_bone_transform(
                    vertex.neighbor_rest_position.into(),
                    vertex.neighbor_skin_index,
                    vertex.neighbor_skin_weight,
                    bones,
                    bind_matrix,
                    bind_matrix_inverse,
                );
                norm.apply(p1.lerp(p2, vertex.edge_factor)).into()
            })
            .collect()
    }
}

/**
 * Copies the skinning data of each particle's vertex and neighbour into
 * per-particle attributes.
 *
 * Fails when the mesh carries no skin indices/weights or when a seed
 * points outside the mesh; callers treat that as "GPU skinning disabled".
 */
pub fn prepare_particle_attributes(
    mesh: &SkinnedMesh,
    seeds: &[ParticleSeed],
) -> anyhow::Result<ParticleSkinAttributes> {
    let (Some(joints), Some(weights)) = (&mesh.joints, &mesh.weights) else {
        bail!("mesh {} has no skinning attributes", mesh.name);
    };
    let vertex = |index: u32| -> anyhow::Result<([u32; 4], [f32; 4], [f32; 3])> {
        let i = index as usize;
        match (joints.get(i), weights.get(i), mesh.positions.get(i)) {
            (Some(joint), Some(weight), Some(position)) => {
                Ok((joint.map(u32::from), *weight, *position))
            }
            _ => bail!(
                "particle references vertex {} but mesh {} has {} vertices",
                index,
                mesh.name,
                mesh.positions.len()
            ),
        }
    };

    let mut vertices = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let (skin_index, skin_weight, rest_position) = vertex(seed.vertex_index)?;
        let neighbor = seed.neighbor_index.unwrap_or(seed.vertex_index);
        let (neighbor_skin_index, neighbor_skin_weight, neighbor_rest_position) =
            vertex(neighbor)?;
        vertices.push(ParticleSkinVertex {
            skin_index,
            skin_weight,
            rest_position,
            // NaN or infinite factors pin the particle to its vertex
            edge_factor: if seed.edge_t.is_finite() {
                seed.edge_t
            } else {
                0.0
            },
            neighbor_skin_index,
            neighbor_skin_weight,
            neighbor_rest_position,
        });
    }
    log::info!(
        "GPU skinning: added skinning attributes for {} particles",
        vertices.len()
    );
    Ok(ParticleSkinAttributes { vertices })
}

/// `bind_inverse * Σ w_k * bone[idx_k] * bind * pos`, the linear blend skinning of one point.
pub fn apply_bone_transform(
    position: cgmath::Vector3<f32>,
    skin_index: [u32; 4],
    skin_weight: [f32; 4],
    bones: &BoneTexture,
    bind_matrix: &cgmath::Matrix4<f32>,
    bind_matrix_inverse: &cgmath::Matrix4<f32>,
) -> cgmath::Vector3<f32> {
    let skin_vertex = bind_matrix * position.extend(1.0);
    let skinned = skin_index
        .iter()
        .zip(skin_weight.iter())
        .fold(cgmath::Vector4::new(0.0, 0.0, 0.0, 0.0), |acc, (&bone, &weight)| {
            acc + bones.bone_matrix(bone as usize) * skin_vertex * weight
        });
    (bind_matrix_inverse * skinned).truncate()
}

/// Maps skinned positions into the particle system's normalised space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormParams {
    pub center: cgmath::Vector3<f32>,
    pub scale: f32,
}

impl Default for NormParams {
    fn default() -> Self {
        Self {
            center: cgmath::Vector3::new(0.0, 0.0, 0.0),
            scale: 1.0,
        }
    }
}

impl NormParams {
    /// Centres the bounding box on the origin and scales its longest side to 2 (the `[-1, 1]` cube).
    pub fn fit(positions: &[[f32; 3]]) -> Self {
        let Some(first) = positions.first() else {
            return Self::default();
        };
        let (min, max) = positions.iter().fold(
            (cgmath::Point3::from(*first), cgmath::Point3::from(*first)),
            |(min, max), p| {
                (
                    cgmath::Point3::new(min.x.min(p[0]), min.y.min(p[1]), min.z.min(p[2])),
                    cgmath::Point3::new(max.x.max(p[0]), max.y.max(p[1]), max.z.max(p[2])),
                )
            },
        );
        let extent = max - min;
        let longest = extent.x.max(extent.y).max(extent.z);
        Self {
            center: min.midpoint(max).to_vec(),
            scale: if longest > f32::EPSILON {
                2.0 / longest
            } else {
                1.0
            },
        }
    }

    pub fn apply(&self, position: cgmath::Vector3<f32>) -> cgmath::Vector3<f32> {
        (position - self.center) * self.scale
    }
}
