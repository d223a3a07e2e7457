use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use skinscope::{
    data_structures::bone_texture::BoneTexture,
    inspect::{self, InspectOptions, ReportLimits},
    load_asset,
    pipelines::particles::PARTICLE_SKINNING_SHADER,
    report::SummaryTable,
    resources::animation::AnimationPlayer,
    skinning::SkinnedMesh,
};

#[derive(Parser, Debug)]
#[command(
    name = "skinscope",
    version,
    about = "Inspect rigs, clips and blend shapes of glTF/GLB models"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report meshes, skins, animations, morph targets and body-part nodes, then a summary table
    Analyze {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Bone names listed per skin
        #[arg(long, default_value_t = 15)]
        bone_limit: usize,
        /// Morph target names listed
        #[arg(long, default_value_t = 10)]
        morph_limit: usize,
        /// Body-part nodes listed
        #[arg(long, default_value_t = 20)]
        body_part_limit: usize,
    },
    /// Short report of a single model: counts, clip names and the first bones
    Single { path: PathBuf },
    /// Pose the skeleton and build the bone texture the particle shader reads
    Bones {
        path: PathBuf,
        /// Animation clip to pose the skeleton with (rest pose when omitted)
        #[arg(long)]
        clip: Option<String>,
        /// Seconds into the clip, wrapped around its duration
        #[arg(long, default_value_t = 0.0)]
        time: f32,
        /// Write the bone texture as a 32-bit float EXR image
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the WGSL particle skinning shader
    Shader,
}

async fn analyze(paths: Vec<PathBuf>, options: InspectOptions) -> Result<()> {
    println!("GLTF Model Analysis");
    println!("Checking for: meshes, rigging (skins), animations, morph targets");
    println!();

    let assets = futures::future::join_all(paths.iter().map(|path| load_asset(path))).await;
    let mut summaries = Vec::new();
    for (path, asset) in paths.iter().zip(assets) {
        match asset {
            Ok(asset) => {
                let report = inspect::analyze(&asset, &options);
                print!("{report}");
                summaries.push(report.summary());
            }
            Err(e) => log::error!("Error analyzing {}: {:#}", path.display(), e),
        }
    }

    print!("{}", SummaryTable(&summaries));
    if summaries.is_empty() {
        bail!("none of the {} models could be analyzed", paths.len());
    }
    Ok(())
}

async fn single(path: PathBuf) -> Result<()> {
    let asset = load_asset(&path).await?;
    print!("{}", inspect::single(&asset));
    Ok(())
}

fn write_exr(texture: &BoneTexture, out: &Path) -> Result<()> {
    let image = image::Rgba32FImage::from_raw(texture.size, texture.size, texture.data.clone())
        .context("bone texture data does not match its size")?;
    image
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}

async fn bones(path: PathBuf, clip: Option<String>, time: f32, out: Option<PathBuf>) -> Result<()> {
    let asset = load_asset(&path).await?;
    let mesh = SkinnedMesh::from_asset(&asset)?;
    let Some(skeleton) = &mesh.skeleton else {
        bail!("{} has no skin, there is nothing to put into a bone texture", asset.name);
    };

    let mut pose = mesh.tree.rest_pose();
    if let Some(name) = clip {
        let clip = mesh.find_animation(&name).with_context(|| {
            let available: Vec<&str> = mesh.animations.iter().map(|c| c.name.as_str()).collect();
            format!("no clip named {name:?}, available: {}", available.join(", "))
        })?;
        let offset = Duration::try_from_secs_f32(time.max(0.0))
            .with_context(|| format!("--time {time} is not a usable number of seconds"))?;
        let mut player = AnimationPlayer::new(clip.clone());
        player.update(offset, &mut pose);
        println!("Clip: \"{}\" at {:.2}s of {:.2}s", clip.name, player.time, clip.duration);
    }

    let texture = mesh.bone_texture(&pose);
    println!("Mesh: {} ({} vertices)", mesh.name, mesh.positions.len());
    println!(
        "Skinning attributes: {}",
        if mesh.has_skinning() { "YES" } else { "NO" }
    );
    println!("Bones: {}", skeleton.bone_count());
    println!(
        "Bone texture: {}x{} RGBA32F ({} bytes)",
        texture.size,
        texture.size,
        texture.as_bytes().len()
    );

    if let Some(out) = out {
        write_exr(&texture, &out)?;
        println!("Wrote {}", out.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let async_runtime = tokio::runtime::Runtime::new()?;

    match cli.cmd {
        Command::Analyze {
            paths,
            bone_limit,
            morph_limit,
            body_part_limit,
        } => {
            let options = InspectOptions {
                limits: ReportLimits {
                    bones: bone_limit,
                    morph_names: morph_limit,
                    body_parts: body_part_limit,
                },
                ..Default::default()
            };
            async_runtime.block_on(analyze(paths, options))
        }
        Command::Single { path } => async_runtime.block_on(single(path)),
        Command::Bones {
            path,
            clip,
            time,
            out,
        } => async_runtime.block_on(bones(path, clip, time, out)),
        Command::Shader => {
            print!("{PARTICLE_SKINNING_SHADER}");
            Ok(())
        }
    }
}
