use serde_json::{Value, json};

const FLOAT: u32 = 5126;
const UNSIGNED_SHORT: u32 = 5123;

pub fn assert_close(actual: [f32; 3], expected: [f32; 3]) {
    for axis in 0..3 {
        assert!(
            (actual[axis] - expected[axis]).abs() < 1e-4,
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }
}

/// Assembles a binary glTF in memory: one buffer, one view per accessor.
#[derive(Default)]
pub struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
}

impl GlbBuilder {
    fn push_view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        self.buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        }));
        self.bin.extend_from_slice(bytes);
        self.buffer_views.len() - 1
    }

    /// `components` is 1, 3, 4 or 16; bounds are written for every float accessor.
    pub fn floats(&mut self, data: &[f32], components: usize) -> usize {
        let kind = match components {
            1 => "SCALAR",
            3 => "VEC3",
            4 => "VEC4",
            16 => "MAT4",
            _ => panic!("unsupported component count {components}"),
        };
        let mut min = vec![f32::MAX; components];
        let mut max = vec![f32::MIN; components];
        for element in data.chunks(components) {
            for (c, value) in element.iter().enumerate() {
                min[c] = min[c].min(*value);
                max[c] = max[c].max(*value);
            }
        }
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": data.len() / components,
            "type": kind,
            "min": min,
            "max": max,
        }));
        self.accessors.len() - 1
    }

    pub fn indices(&mut self, data: &[u16]) -> usize {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": UNSIGNED_SHORT,
            "count": data.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    pub fn joints(&mut self, data: &[[u16; 4]]) -> usize {
        let bytes: Vec<u8> = data
            .iter()
            .flatten()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let view = self.push_view(&bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": UNSIGNED_SHORT,
            "count": data.len(),
            "type": "VEC4",
        }));
        self.accessors.len() - 1
    }

    /// Adds buffers, views and accessors to `document` and wraps everything into GLB chunks.
    pub fn finish(mut self, mut document: Value) -> Vec<u8> {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        document["asset"] = json!({ "version": "2.0" });
        if !self.bin.is_empty() {
            document["buffers"] = json!([{ "byteLength": self.bin.len() }]);
            document["bufferViews"] = Value::Array(self.buffer_views);
            document["accessors"] = Value::Array(self.accessors);
        }

        let mut json_chunk = serde_json::to_vec(&document).expect("serialize glTF json");
        while json_chunk.len() % 4 != 0 {
            json_chunk.push(b' ');
        }

        let mut total = 12 + 8 + json_chunk.len();
        if !self.bin.is_empty() {
            total += 8 + self.bin.len();
        }
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json_chunk);
        if !self.bin.is_empty() {
            glb.extend_from_slice(&(self.bin.len() as u32).to_le_bytes());
            glb.extend_from_slice(b"BIN\0");
            glb.extend_from_slice(&self.bin);
        }
        glb
    }
}

fn translation(x: f32, y: f32, z: f32) -> [f32; 16] {
    [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        x, y, z, 1.0,
    ]
}

/**
 * A small rigged character.
 *
 * Node 0 "Armature" holds the joint chain Hips (y = 1) -> Spine (+0.5) ->
 * Head (+0.5) and the skinned mesh node "Body". The mesh is a 4 vertex
 * quad (2 triangles) with two morph targets named in `extras.targetNames`.
 * Vertex 0 follows Hips, vertex 1 and 2 blend two joints, vertex 3 follows Head.
 *
 * Clips: "Walk" (2 channels, 2s: Spine rotates 90 degrees about z at 1s and
 * back at 2s, Hips rises to y = 1.2 at 1.5s) and an unnamed clip (1 step
 * scale channel on Head, 0.5s).
 */
pub fn rigged_character_glb() -> Vec<u8> {
    let mut builder = GlbBuilder::default();
    let positions = builder.floats(
        &[
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 2.0, 0.0, //
            1.0, 2.0, 0.0,
        ],
        3,
    );
    let indices = builder.indices(&[0, 1, 2, 2, 1, 3]);
    let joints = builder.joints(&[[0, 0, 0, 0], [0, 1, 0, 0], [1, 2, 0, 0], [2, 0, 0, 0]]);
    let weights = builder.floats(
        &[
            1.0, 0.0, 0.0, 0.0, //
            0.5, 0.5, 0.0, 0.0, //
            0.5, 0.5, 0.0, 0.0, //
            1.0, 0.0, 0.0, 0.0,
        ],
        4,
    );
    let smile = builder.floats(&[0.0, 0.1, 0.0, 0.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 3);
    let blink = builder.floats(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -0.1, 0.0, 0.0, -0.1, 0.0], 3);

    let mut inverse_binds = Vec::new();
    inverse_binds.extend(translation(0.0, -1.0, 0.0));
    inverse_binds.extend(translation(0.0, -1.5, 0.0));
    inverse_binds.extend(translation(0.0, -2.0, 0.0));
    let inverse_binds = builder.floats(&inverse_binds, 16);

    let half = std::f32::consts::FRAC_1_SQRT_2;
    let walk_rotation_times = builder.floats(&[0.0, 1.0, 2.0], 1);
    let walk_rotations = builder.floats(
        &[
            0.0, 0.0, 0.0, 1.0, //
            0.0, 0.0, half, half, //
            0.0, 0.0, 0.0, 1.0,
        ],
        4,
    );
    let walk_translation_times = builder.floats(&[0.0, 1.5], 1);
    let walk_translations = builder.floats(&[0.0, 1.0, 0.0, 0.0, 1.2, 0.0], 3);
    let idle_times = builder.floats(&[0.0, 0.5], 1);
    let idle_scales = builder.floats(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0], 3);

    builder.finish(json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "Armature", "children": [1, 4] },
            { "name": "Hips", "translation": [0.0, 1.0, 0.0], "children": [2] },
            { "name": "Spine", "translation": [0.0, 0.5, 0.0], "children": [3] },
            { "name": "Head", "translation": [0.0, 0.5, 0.0] },
            { "name": "Body", "mesh": 0, "skin": 0 },
        ],
        "meshes": [{
            "name": "BodyMesh",
            "primitives": [{
                "attributes": {
                    "POSITION": positions,
                    "JOINTS_0": joints,
                    "WEIGHTS_0": weights,
                },
                "indices": indices,
                "targets": [{ "POSITION": smile }, { "POSITION": blink }],
            }],
            "weights": [0.0, 0.0],
            "extras": { "targetNames": ["Smile", "Blink"] },
        }],
        "skins": [{
            "joints": [1, 2, 3],
            "inverseBindMatrices": inverse_binds,
            "skeleton": 1,
        }],
        "animations": [
            {
                "name": "Walk",
                "samplers": [
                    { "input": walk_rotation_times, "output": walk_rotations, "interpolation": "LINEAR" },
                    { "input": walk_translation_times, "output": walk_translations, "interpolation": "LINEAR" },
                ],
                "channels": [
                    { "sampler": 0, "target": { "node": 2, "path": "rotation" } },
                    { "sampler": 1, "target": { "node": 1, "path": "translation" } },
                ],
            },
            {
                "samplers": [
                    { "input": idle_times, "output": idle_scales, "interpolation": "STEP" },
                ],
                "channels": [
                    { "sampler": 0, "target": { "node": 3, "path": "scale" } },
                ],
            },
        ],
    }))
}

/// One non-indexed triangle on an unnamed node: no skin, no clips, no morph targets.
pub fn static_triangle_glb() -> Vec<u8> {
    let mut builder = GlbBuilder::default();
    let positions = builder.floats(&[0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 2.0, 0.0], 3);
    builder.finish(json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [1.0, 0.0, 0.0] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
    }))
}

/// The static triangle, declaring `extensions` as used and required.
pub fn triangle_requiring_glb(extensions: &[&str]) -> Vec<u8> {
    let mut builder = GlbBuilder::default();
    let positions = builder.floats(&[0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 2.0, 0.0], 3);
    builder.finish(json!({
        "extensionsUsed": extensions,
        "extensionsRequired": extensions,
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Tri", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
    }))
}

/// A triangle whose node refers to a mesh that does not exist.
pub fn dangling_mesh_glb() -> Vec<u8> {
    let mut builder = GlbBuilder::default();
    let positions = builder.floats(&[0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 2.0, 0.0], 3);
    builder.finish(json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 3 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
    }))
}

/**
 * Two nodes that are each other's child: "Loop" (mesh, +1 x) and
 * "Back" (+2 y). `gltf` does not reject parent cycles.
 */
pub fn cyclic_nodes_glb() -> Vec<u8> {
    let mut builder = GlbBuilder::default();
    let positions = builder.floats(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 3);
    builder.finish(json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "Loop", "mesh": 0, "translation": [1.0, 0.0, 0.0], "children": [1] },
            { "name": "Back", "translation": [0.0, 2.0, 0.0], "children": [0] },
        ],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
    }))
}
