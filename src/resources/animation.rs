//! Animation clips read from glTF and sampled into a [`Pose`].

use cgmath::{InnerSpace, VectorSpace};

use crate::data_structures::scene_graph::Pose;

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<cgmath::Vector3<f32>>),
    Rotation(Vec<cgmath::Quaternion<f32>>),
    Scale(Vec<cgmath::Vector3<f32>>),
    // morph target weights, they don't move joints
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    CubicSpline,
}

impl From<gltf::animation::Interpolation> for Interpolation {
    fn from(interpolation: gltf::animation::Interpolation) -> Self {
        match interpolation {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        }
    }
}

/// One animated property of one node.
#[derive(Clone, Debug)]
pub struct Channel {
    pub node: usize,
    pub interpolation: Interpolation,
    pub timestamps: Vec<f32>,
    /// For `CubicSpline` this holds `[in_tangent, value, out_tangent]` per key.
    pub keyframes: Keyframes,
}

/// An animation clip: a named set of channels sharing one timeline.
#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<Channel>,
    pub duration: f32,
}

pub fn read_animations(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> Vec<AnimationClip> {
    document
        .animations()
        .map(|animation| {
            let mut channels = Vec::new();
            for channel in animation.channels() {
                let reader = channel
                    .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
                let timestamps: Vec<f32> = match reader.read_inputs() {
                    Some(inputs) => inputs.collect(),
                    None => {
                        log::warn!("No timestamps found in channel {}", channel.index());
                        Vec::new()
                    }
                };
                let keyframes = match reader.read_outputs() {
                    Some(gltf::animation::util::ReadOutputs::Translations(translations)) => {
                        Keyframes::Translation(translations.map(Into::into).collect())
                    }
                    Some(gltf::animation::util::ReadOutputs::Rotations(rotations)) => {
                        Keyframes::Rotation(
                            rotations
                                .into_f32()
                                .map(|[x, y, z, w]| cgmath::Quaternion::new(w, x, y, z))
                                .collect(),
                        )
                    }
                    Some(gltf::animation::util::ReadOutputs::Scales(scales)) => {
                        Keyframes::Scale(scales.map(Into::into).collect())
                    }
                    Some(gltf::animation::util::ReadOutputs::MorphTargetWeights(_)) => {
                        Keyframes::Other
                    }
                    None => {
                        log::warn!("No keyframes found in channel {}", channel.index());
                        Keyframes::Other
                    }
                };
                channels.push(Channel {
                    node: channel.target().node().index(),
                    interpolation: channel.sampler().interpolation().into(),
                    timestamps,
                    keyframes,
                });
            }
            let duration = channels
                .iter()
                .filter_map(|channel| channel.timestamps.last().copied())
                .fold(0.0f32, f32::max);
            AnimationClip {
                name: animation.name().unwrap_or_default().to_string(),
                channels,
                duration,
            }
        })
        .collect()
}

/**
 * Where `time` falls on a channel's timeline: the left key, the right key
 * and the normalised position between them. Out-of-range times clamp to
 * the first or last key.
 */
fn locate(timestamps: &[f32], time: f32) -> Option<(usize, usize, f32, f32)> {
    let last = timestamps.len().checked_sub(1)?;
    if time.is_nan() || time <= timestamps[0] {
        return Some((0, 0, 0.0, 0.0));
    }
    if time >= timestamps[last] {
        return Some((last, last, 0.0, 0.0));
    }
    // first key strictly after `time`; guaranteed to be in 1..=last here
    let right = timestamps.partition_point(|&t| t <= time);
    let left = right - 1;
    let dt = timestamps[right] - timestamps[left];
    let t = if dt > 0.0 {
        (time - timestamps[left]) / dt
    } else {
        0.0
    };
    Some((left, right, t, dt))
}

fn hermite<V>(v0: V, out0: V, v1: V, in1: V, t: f32, dt: f32) -> V
where
    V: VectorSpace<Scalar = f32>,
{
    let t2 = t * t;
    let t3 = t2 * t;
    v0 * (2.0 * t3 - 3.0 * t2 + 1.0)
        + out0 * ((t3 - 2.0 * t2 + t) * dt)
        + v1 * (-2.0 * t3 + 3.0 * t2)
        + in1 * ((t3 - t2) * dt)
}

fn sample_vec3(
    values: &[cgmath::Vector3<f32>],
    interpolation: Interpolation,
    (left, right, t, dt): (usize, usize, f32, f32),
) -> Option<cgmath::Vector3<f32>> {
    match interpolation {
        Interpolation::Step => values.get(left).copied(),
        Interpolation::Linear => Some(values.get(left)?.lerp(*values.get(right)?, t)),
        Interpolation::CubicSpline => {
            let v0 = *values.get(left * 3 + 1)?;
            if left == right {
                return Some(v0);
            }
            Some(hermite(
                v0,
                *values.get(left * 3 + 2)?,
                *values.get(right * 3 + 1)?,
                *values.get(right * 3)?,
                t,
                dt,
            ))
        }
    }
}

fn sample_rotation(
    values: &[cgmath::Quaternion<f32>],
    interpolation: Interpolation,
    (left, right, t, dt): (usize, usize, f32, f32),
) -> Option<cgmath::Quaternion<f32>> {
    match interpolation {
        Interpolation::Step => values.get(left).copied(),
        Interpolation::Linear => {
            let from = *values.get(left)?;
            let to = *values.get(right)?;
            if left == right {
                return Some(from);
            }
            Some(from.slerp(to, t))
        }
        Interpolation::CubicSpline => {
            let v0 = *values.get(left * 3 + 1)?;
            if left == right {
                return Some(v0.normalize());
            }
            let q = hermite(
                v0,
                *values.get(left * 3 + 2)?,
                *values.get(right * 3 + 1)?,
                *values.get(right * 3)?,
                t,
                dt,
            );
            Some(q.normalize())
        }
    }
}

impl AnimationClip {
    /// Writes the animated properties at `time` into `pose`, leaving the rest untouched.
    pub fn sample(&self, time: f32, pose: &mut Pose) {
        for channel in &self.channels {
            let Some(span) = locate(&channel.timestamps, time) else {
                continue;
            };
            let Some(local) = pose.get_mut(channel.node) else {
                continue;
            };
            match &channel.keyframes {
                Keyframes::Translation(values) => {
                    if let Some(position) = sample_vec3(values, channel.interpolation, span) {
                        local.position = position;
                    }
                }
                Keyframes::Rotation(values) => {
                    if let Some(rotation) = sample_rotation(values, channel.interpolation, span) {
                        local.rotation = rotation;
                    }
                }
                Keyframes::Scale(values) => {
                    if let Some(scale) = sample_vec3(values, channel.interpolation, span) {
                        local.scale = scale;
                    }
                }
                Keyframes::Other => {}
            }
        }
    }
}

/// Plays one clip and keeps its own clock.
#[derive(Clone, Debug)]
pub struct AnimationPlayer {
    pub clip: AnimationClip,
    pub time: f32,
    pub looping: bool,
}

impl AnimationPlayer {
    pub fn new(clip: AnimationClip) -> Self {
        Self {
            clip,
            time: 0.0,
            looping: true,
        }
    }

    /// Advances the clock by `delta` seconds and samples the clip into `pose`.
    pub fn update(&mut self, delta: std::time::Duration, pose: &mut Pose) {
        self.time += delta.as_secs_f32();
        let duration = self.clip.duration;
        if duration <= 0.0 {
            self.time = 0.0;
        } else if self.looping {
            self.time %= duration;
        } else {
            self.time = self.time.min(duration);
        }
        self.clip.sample(self.time, pose);
    }
}
