//! Bone matrices packed into a float texture.
//!
//! Each bone takes four consecutive RGBA32F texels, one per matrix
//! column. The texture is square with a power-of-two side of at least 4,
//! so a bone's four texels never straddle a row: bone `i` lives at
//! `x = (4i) mod size`, `y = (4i) div size`.

use cgmath::Zero;

/// Smallest side a bone texture is ever allocated with.
pub const MIN_BONE_TEXTURE_SIZE: u32 = 4;

#[derive(Clone, Debug, PartialEq)]
pub struct BoneTexture {
    pub size: u32,
    pub data: Vec<f32>,
    bone_count: usize,
}

impl BoneTexture {
    /// Side length of the square texture needed for `bone_count` bones.
    pub fn size_for(bone_count: usize) -> u32 {
        let side = ((bone_count * 4) as f64).sqrt().ceil() as u32;
        side.next_power_of_two().max(MIN_BONE_TEXTURE_SIZE)
    }

    pub fn new(bone_count: usize) -> Self {
        let size = Self::size_for(bone_count);
        Self {
            size,
            data: vec![0.0; (size * size * 4) as usize],
            bone_count,
        }
    }

    pub fn from_matrices(matrices: &[cgmath::Matrix4<f32>]) -> Self {
        let mut texture = Self::new(matrices.len());
        texture.write_matrices(matrices);
        texture
    }

    /**
     * Overwrites the stored bone matrices in place.
     *
     * Extra matrices beyond the capacity the texture was sized for are
     * ignored; per-frame updates never change the bone count.
     */
    pub fn write_matrices(&mut self, matrices: &[cgmath::Matrix4<f32>]) {
        if matrices.len() > self.bone_count {
            log::warn!(
                "bone texture sized for {} bones received {}, extra bones are dropped",
                self.bone_count,
                matrices.len()
            );
        }
        for (bone, matrix) in matrices.iter().take(self.bone_count).enumerate() {
            let columns: &[f32; 16] = matrix.as_ref();
            self.data[bone * 16..bone * 16 + 16].copy_from_slice(columns);
        }
    }

    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    /// Texel coordinate of the first column of bone `bone`.
    pub fn texel_of(&self, bone: usize) -> (u32, u32) {
        let j = bone as u32 * 4;
        (j % self.size, j / self.size)
    }

    /**
     * Reads bone `bone` back with the same addressing the vertex shader uses.
     *
     * Bones past `bone_count` read whatever the texture holds there, which is
     * the zero padding. Addresses outside the texture read as zero, one of
     * the results WGSL allows for an out-of-bounds `textureLoad`.
     */
    pub fn bone_matrix(&self, bone: usize) -> cgmath::Matrix4<f32> {
        let texels = (self.size * self.size) as usize;
        let first = match bone.checked_mul(4) {
            Some(first) if first < texels && texels - first >= 4 => first,
            _ => return cgmath::Matrix4::zero(),
        };
        // a power-of-two side keeps all four texels of a bone on one row
        let (x, y) = self.texel_of(bone);
        debug_assert_eq!((y * self.size + x) as usize, first);
        let texel = |dx: usize| {
            let offset = (first + dx) * 4;
            cgmath::Vector4::new(
                self.data[offset],
                self.data[offset + 1],
                self.data[offset + 2],
                self.data[offset + 3],
            )
        };
        cgmath::Matrix4::from_cols(texel(0), texel(1), texel(2), texel(3))
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Bytes per texture row, as `write_texture` expects it.
    pub fn bytes_per_row(&self) -> u32 {
        self.size * 4 * std::mem::size_of::<f32>() as u32
    }
}
