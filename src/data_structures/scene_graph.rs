//! Flattened node hierarchy of a glTF document.
//!
//! glTF stores children per node; skinning needs the opposite direction
//! (walk up from a joint to the root). [`NodeTree`] keeps a parent table
//! plus the rest-pose locals so world matrices can be rebuilt for any
//! [`Pose`] without touching the document again.

use cgmath::SquareMatrix;

use crate::data_structures::transform::Transform;

/// Per-node local transforms, indexed by glTF node index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub locals: Vec<Transform>,
}

impl Pose {
    pub fn get_mut(&mut self, node: usize) -> Option<&mut Transform> {
        self.locals.get_mut(node)
    }
}

#[derive(Clone, Debug)]
pub struct NodeTree {
    pub names: Vec<String>,
    pub parents: Vec<Option<usize>>,
    rest: Vec<Transform>,
}

impl NodeTree {
    pub fn from_document(document: &gltf::Document) -> Self {
        let node_count = document.nodes().len();
        let mut parents = vec![None; node_count];
        let mut names = Vec::with_capacity(node_count);
        let mut rest = Vec::with_capacity(node_count);
        for node in document.nodes() {
            for child in node.children() {
                parents[child.index()] = Some(node.index());
            }
            names.push(node.name().unwrap_or_default().to_string());
            rest.push(Transform::from(node.transform()));
        }
        Self {
            names,
            parents,
            rest,
        }
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// The pose described by the node transforms in the document itself.
    pub fn rest_pose(&self) -> Pose {
        Pose {
            locals: self.rest.clone(),
        }
    }

    /**
     * Resolves every node's world matrix for `pose`.
     *
     * Nodes may be listed in any order. Each node walks up to its first
     * resolved ancestor (or a root) and the chain is then finished top-down.
     * `gltf` accepts parent cycles, so a node reached twice on one walk
     * closes a cycle and the chain is anchored there as if it were a root.
     */
    pub fn world_matrices(&self, pose: &Pose) -> Vec<cgmath::Matrix4<f32>> {
        let mut world: Vec<Option<cgmath::Matrix4<f32>>> = vec![None; self.len()];
        let mut on_chain = vec![false; self.len()];
        let mut chain = Vec::new();
        for node in 0..self.len() {
            let mut anchor = cgmath::Matrix4::identity();
            let mut current = Some(node);
            while let Some(index) = current {
                if let Some(matrix) = world[index] {
                    anchor = matrix;
                    break;
                }
                if on_chain[index] {
                    log::warn!(
                        "node {} ({:?}) is its own ancestor, treating it as a root",
                        index,
                        self.names[index]
                    );
                    break;
                }
                on_chain[index] = true;
                chain.push(index);
                current = self.parents[index];
            }
            while let Some(index) = chain.pop() {
                on_chain[index] = false;
                let local = pose
                    .locals
                    .get(index)
                    .unwrap_or(&self.rest[index])
                    .to_matrix();
                anchor = anchor * local;
                world[index] = Some(anchor);
            }
        }
        world
            .into_iter()
            .map(|m| m.unwrap_or_else(cgmath::Matrix4::identity))
            .collect()
    }
}
