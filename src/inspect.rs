//! Read-only statistics about a loaded glTF asset.
//!
//! [`analyze`] walks the document once and collects everything the
//! `analyze` command prints: geometry totals, skins, animation clips,
//! morph targets and nodes whose names look like body parts. [`single`]
//! collects the smaller set printed by the `single` command. Formatting
//! lives in [`crate::report`].

use crate::resources::GltfAsset;

/// Substrings that mark a node as a body part (matched against the lowercased name).
pub const BODY_PART_KEYWORDS: [&str; 11] = [
    "head", "neck", "spine", "arm", "hand", "leg", "foot", "hips", "eye", "jaw", "mouth",
];

/// How many names each list in a report shows before collapsing into `... and N more`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportLimits {
    pub bones: usize,
    pub morph_names: usize,
    pub body_parts: usize,
}

impl Default for ReportLimits {
    fn default() -> Self {
        Self {
            bones: 15,
            morph_names: 10,
            body_parts: 20,
        }
    }
}

#[derive(Clone, Debug)]
pub struct InspectOptions {
    pub limits: ReportLimits,
    pub body_part_keywords: Vec<String>,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            limits: ReportLimits::default(),
            body_part_keywords: BODY_PART_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkinReport {
    pub bone_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationReport {
    /// `None` when the clip has no name in the file.
    pub name: Option<String>,
    pub channel_count: usize,
    /// Largest final input timestamp over the clip's samplers, in seconds.
    pub duration: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelReport {
    pub name: String,
    pub mesh_count: usize,
    pub vertex_count: u64,
    pub triangle_count: u64,
    pub skins: Vec<SkinReport>,
    pub animations: Vec<AnimationReport>,
    pub morph_target_count: usize,
    pub morph_target_names: Vec<String>,
    pub node_count: usize,
    pub body_part_nodes: Vec<String>,
    pub limits: ReportLimits,
}

/// One row of the summary table printed after all models.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSummary {
    pub name: String,
    pub vertices: u64,
    pub skins: usize,
    pub animations: usize,
    pub morph_targets: usize,
}

impl ModelReport {
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            name: self.name.clone(),
            vertices: self.vertex_count,
            skins: self.skins.len(),
            animations: self.animations.len(),
            morph_targets: self.morph_target_count,
        }
    }
}

/// The narrow dump of the `single` command.
#[derive(Clone, Debug, PartialEq)]
pub struct SingleReport {
    pub path: String,
    pub mesh_count: usize,
    pub skin_count: usize,
    pub animation_names: Vec<String>,
    pub first_skin_bones: Option<Vec<String>>,
}

fn node_name(node: &gltf::Node) -> String {
    node.name().unwrap_or_default().to_string()
}

fn skin_bone_names(skin: &gltf::Skin) -> Vec<String> {
    skin.joints().map(|joint| node_name(&joint)).collect()
}

/// `extras.targetNames` of a mesh, the de-facto place exporters store blend shape names.
fn morph_target_names(mesh: &gltf::Mesh) -> Vec<String> {
    let Some(raw) = mesh.extras() else {
        return Vec::new();
    };
    let extras: serde_json::Value = match serde_json::from_str(raw.get()) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("mesh {} has unreadable extras: {}", mesh.index(), e);
            return Vec::new();
        }
    };
    extras
        .get("targetNames")
        .and_then(|names| names.as_array())
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn animation_duration(asset: &GltfAsset, animation: &gltf::Animation) -> f32 {
    animation
        .samplers()
        .filter_map(|sampler| {
            gltf::accessor::Iter::<f32>::new(sampler.input(), |buffer| asset.buffer(buffer))
                .and_then(|times| times.last())
        })
        .fold(0.0f32, f32::max)
}

pub fn is_body_part(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords.iter().any(|keyword| name.contains(keyword.as_str()))
}

pub fn analyze(asset: &GltfAsset, options: &InspectOptions) -> ModelReport {
    let document = &asset.document;

    let mut vertex_count = 0u64;
    let mut triangle_count = 0u64;
    let mut morph_target_count = 0usize;
    let mut morph_target_names_all = Vec::new();
    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            if let Some(positions) = primitive.get(&gltf::Semantic::Positions) {
                vertex_count += positions.count() as u64;
            }
            if let Some(indices) = primitive.indices() {
                triangle_count += indices.count() as u64 / 3;
            }
            morph_target_count += primitive.morph_targets().count();
        }
        morph_target_names_all.extend(morph_target_names(&mesh));
    }

    let skins = document
        .skins()
        .map(|skin| SkinReport {
            bone_names: skin_bone_names(&skin),
        })
        .collect();

    let animations = document
        .animations()
        .map(|animation| AnimationReport {
            name: animation
                .name()
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            channel_count: animation.channels().count(),
            duration: animation_duration(asset, &animation),
        })
        .collect();

    let body_part_nodes = document
        .nodes()
        .map(|node| node_name(&node))
        .filter(|name| is_body_part(name, &options.body_part_keywords))
        .collect();

    ModelReport {
        name: asset.name.clone(),
        mesh_count: document.meshes().count(),
        vertex_count,
        triangle_count,
        skins,
        animations,
        morph_target_count,
        morph_target_names: morph_target_names_all,
        node_count: document.nodes().count(),
        body_part_nodes,
        limits: options.limits,
    }
}

pub fn single(asset: &GltfAsset) -> SingleReport {
    let document = &asset.document;
    SingleReport {
        path: asset.path.display().to_string(),
        mesh_count: document.meshes().count(),
        skin_count: document.skins().count(),
        animation_names: document
            .animations()
            .map(|animation| animation.name().unwrap_or_default().to_string())
            .collect(),
        first_skin_bones: document.skins().next().map(|skin| skin_bone_names(&skin)),
    }
}
