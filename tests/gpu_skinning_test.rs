#[cfg(feature = "integration-tests")]
use skinscope::{
    context::GpuContext,
    data_structures::{bone_texture::BoneTexture, scene_graph::Pose},
    load_asset_from_slice,
    pipelines::particles::{
        ParticleBuffers, ParticleFrame, ParticleFrameUniform, ParticleVertex, mk_particle_pipeline,
        setup_gpu_skinning,
    },
    skinning::{NormParams, ParticleSeed, SkinnedMesh, prepare_particle_attributes},
};

#[cfg(feature = "integration-tests")]
use crate::common::test_utils::rigged_character_glb;

#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
fn rigged_mesh() -> SkinnedMesh {
    let asset = load_asset_from_slice("rigged.glb", &rigged_character_glb()).unwrap();
    SkinnedMesh::from_asset(&asset).unwrap()
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_upload_posed_bone_texture() {
    futures::executor::block_on(async {
        let ctx = GpuContext::headless().await.expect("no headless GPU");
        let mesh = rigged_mesh();
        let mut pose = mesh.tree.rest_pose();
        mesh.find_animation("Walk").unwrap().sample(1.0, &mut pose);

        let skinning =
            setup_gpu_skinning(&ctx.device, &ctx.queue, &mesh, &pose, NormParams::default())
                .unwrap();
        assert_eq!(skinning.bone_count, 3);
        assert_eq!(skinning.bone_texture_size, 4);
        assert_eq!(skinning.uniform.use_gpu_skinning, 1);

        let texels = ctx
            .read_bone_texture(&skinning.bone_texture, skinning.bone_texture_size)
            .await
            .unwrap();
        assert_eq!(texels, mesh.bone_texture(&pose).data);
    });
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_replace_bones_on_update() {
    futures::executor::block_on(async {
        let ctx = GpuContext::headless().await.expect("no headless GPU");
        let mesh = rigged_mesh();
        let rest = mesh.tree.rest_pose();
        let skinning =
            setup_gpu_skinning(&ctx.device, &ctx.queue, &mesh, &rest, NormParams::default())
                .unwrap();

        let mut pose = mesh.tree.rest_pose();
        mesh.find_animation("Walk").unwrap().sample(1.5, &mut pose);
        let posed = mesh.bone_texture(&pose);
        skinning.update(&ctx.queue, &posed).unwrap();

        let texels = ctx
            .read_bone_texture(&skinning.bone_texture, skinning.bone_texture_size)
            .await
            .unwrap();
        assert_eq!(texels, posed.data);

        let too_big = BoneTexture::new(17);
        let error = skinning.update(&ctx.queue, &too_big).unwrap_err();
        assert!(error.to_string().contains("16x16"));
    });
}

#[cfg(feature = "integration-tests")]
const TARGET_SIZE: u32 = 64;

/**
 * Draws one 6 px sprite per seed with no effects applied and returns the
 * RGBA8 target. The view pushes the cloud to z = -1 so sprites are
 * `size * 300` px wide, the projection moves that depth into the clip range
 * and leaves x/y untouched: NDC equals the normalised skinned position.
 */
#[cfg(feature = "integration-tests")]
async fn render_cloud(
    ctx: &GpuContext,
    mesh: &SkinnedMesh,
    pose: &Pose,
    norm: NormParams,
    seeds: &[ParticleSeed],
) -> Vec<u8> {
    let skinning = setup_gpu_skinning(&ctx.device, &ctx.queue, mesh, pose, norm).unwrap();
    let attributes = prepare_particle_attributes(mesh, seeds).unwrap();
    let particles: Vec<ParticleVertex> = seeds
        .iter()
        .map(|_| ParticleVertex {
            // far outside the target, only visible if skinning were skipped
            position: [3.0, 3.0, 0.0],
            size: 6.0 / 300.0,
            scattered_position: [3.0, 3.0, 0.0],
            seeds: [0.1, 0.2, 0.3, 0.4],
            drift: [0.0, 1.0, 0.0],
        })
        .collect();
    let buffers = ParticleBuffers::new(&ctx.device, &particles, &attributes).unwrap();
    assert_eq!(buffers.amount, seeds.len() as u32);
    assert!(ParticleBuffers::new(&ctx.device, &particles[..1], &attributes).is_err());

    let mut uniform = ParticleFrameUniform::default();
    uniform.view = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, -1.0, 1.0],
    ];
    uniform.projection = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 1.5, 1.0],
    ];
    uniform.viewport = [TARGET_SIZE as f32, TARGET_SIZE as f32];
    let frame = ParticleFrame::new(&ctx.device, uniform);
    frame.write_to_buffer(&ctx.queue);

    let format = wgpu::TextureFormat::Rgba8Unorm;
    let pipeline = mk_particle_pipeline(
        &ctx.device,
        format,
        None,
        &skinning.bind_group_layout,
        &frame.bind_group_layout,
    );
    let target = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("particle target"),
        size: wgpu::Extent3d {
            width: TARGET_SIZE,
            height: TARGET_SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("particle test encoder"),
        });
    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("particle test pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        render_pass.set_pipeline(&pipeline);
        buffers.draw(&mut render_pass, &skinning, &frame);
    }
    ctx.queue.submit(Some(encoder.finish()));

    ctx.read_texture(&target, 4).await.unwrap()
}

/// Pixel coordinate of an NDC position, y pointing down.
#[cfg(feature = "integration-tests")]
fn to_pixel(position: [f32; 3]) -> (f32, f32) {
    let size = TARGET_SIZE as f32;
    (
        (position[0] + 1.0) / 2.0 * size,
        (1.0 - position[1]) / 2.0 * size,
    )
}

/// Every expected sprite centre is lit and every lit pixel belongs to one of them.
#[cfg(feature = "integration-tests")]
fn assert_sprites_at(pixels: &[u8], expected: &[[f32; 3]]) {
    let lit = |x: u32, y: u32| pixels[((y * TARGET_SIZE + x) * 4) as usize] > 127;
    let centres: Vec<(f32, f32)> = expected.iter().map(|p| to_pixel(*p)).collect();

    for (position, (cx, cy)) in expected.iter().zip(centres.iter()) {
        assert!(
            position[0].abs() < 0.9 && position[1].abs() < 0.9,
            "{position:?} is too close to the edge of the target"
        );
        assert!(
            lit(*cx as u32, *cy as u32),
            "no sprite at {position:?} (pixel {cx:.1}, {cy:.1})"
        );
    }
    for y in 0..TARGET_SIZE {
        for x in 0..TARGET_SIZE {
            if !lit(x, y) {
                continue;
            }
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            assert!(
                centres
                    .iter()
                    .any(|(cx, cy)| (px - cx).hypot(py - cy) < 4.5),
                "pixel ({x}, {y}) is lit but no particle is expected there"
            );
        }
    }
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_place_sprites_where_cpu_skinning_puts_particles() {
    futures::executor::block_on(async {
        let ctx = GpuContext::headless().await.expect("no headless GPU");
        let mesh = rigged_mesh();
        let fit = NormParams::fit(&mesh.positions);
        let norm = NormParams {
            center: fit.center,
            scale: fit.scale * 0.5,
        };
        let seeds = [
            ParticleSeed::on_vertex(0),
            ParticleSeed::on_vertex(1),
            ParticleSeed::on_edge(2, 3, 0.5),
            ParticleSeed::on_vertex(3),
        ];
        let attributes = prepare_particle_attributes(&mesh, &seeds).unwrap();

        let rest = mesh.tree.rest_pose();
        let mut walk = mesh.tree.rest_pose();
        mesh.find_animation("Walk").unwrap().sample(1.0, &mut walk);

        for pose in [rest, walk] {
            let expected = attributes.skin_on_cpu(
                &mesh.bone_texture(&pose),
                &mesh.bind_matrix,
                &mesh.bind_matrix_inverse,
                &norm,
            );
            let pixels = render_cloud(&ctx, &mesh, &pose, norm, &seeds).await;
            assert_sprites_at(&pixels, &expected);
        }
    });
}
