//! Plain-text rendering of inspection results.

use std::fmt;

use crate::inspect::{ModelReport, ModelSummary, SingleReport};

const BANNER_WIDTH: usize = 60;
const SUMMARY_RULE_WIDTH: usize = 75;

/// Formats `value` with comma thousands separators: `1234567` -> `1,234,567`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

fn write_more(f: &mut fmt::Formatter<'_>, indent: &str, total: usize, shown: usize) -> fmt::Result {
    if total > shown {
        writeln!(f, "{indent}... and {} more", total - shown)?;
    }
    Ok(())
}

impl fmt::Display for ModelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let banner = "=".repeat(BANNER_WIDTH);
        writeln!(f)?;
        writeln!(f, "{banner}")?;
        writeln!(f, "MODEL: {}", self.name)?;
        writeln!(f, "{banner}")?;

        writeln!(f)?;
        writeln!(f, "Meshes: {}", self.mesh_count)?;
        writeln!(f, "Vertices: {}", group_thousands(self.vertex_count))?;
        writeln!(f, "Triangles: {}", group_thousands(self.triangle_count))?;

        writeln!(f)?;
        writeln!(f, "Skins (rigs): {}", self.skins.len())?;
        for (i, skin) in self.skins.iter().enumerate() {
            writeln!(f, "  Skin {i}: {} bones", skin.bone_names.len())?;
            for bone in skin.bone_names.iter().take(self.limits.bones) {
                writeln!(f, "    - {bone}")?;
            }
            write_more(f, "    ", skin.bone_names.len(), self.limits.bones)?;
        }

        writeln!(f)?;
        writeln!(f, "Animations: {}", self.animations.len())?;
        for animation in &self.animations {
            writeln!(
                f,
                "  - \"{}\": {} channels, {:.2}s",
                animation.name.as_deref().unwrap_or("unnamed"),
                animation.channel_count,
                animation.duration
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Morph targets (blend shapes): {}", self.morph_target_count)?;
        if !self.morph_target_names.is_empty() {
            let shown: Vec<&str> = self
                .morph_target_names
                .iter()
                .take(self.limits.morph_names)
                .map(String::as_str)
                .collect();
            writeln!(f, "  Names: {}", shown.join(", "))?;
            write_more(
                f,
                "  ",
                self.morph_target_names.len(),
                self.limits.morph_names,
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Nodes: {}", self.node_count)?;
        if !self.body_part_nodes.is_empty() {
            writeln!(f, "Body part nodes found:")?;
            for node in self.body_part_nodes.iter().take(self.limits.body_parts) {
                writeln!(f, "  - {node}")?;
            }
            write_more(f, "  ", self.body_part_nodes.len(), self.limits.body_parts)?;
        }
        Ok(())
    }
}

/// The table printed after every model of an `analyze` run.
pub struct SummaryTable<'a>(pub &'a [ModelSummary]);

impl fmt::Display for SummaryTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let banner = "=".repeat(BANNER_WIDTH);
        writeln!(f)?;
        writeln!(f, "{banner}")?;
        writeln!(f, "SUMMARY")?;
        writeln!(f, "{banner}")?;
        writeln!(f)?;
        writeln!(
            f,
            "Model                           Vertices    Rigged  Anims  BlendShapes"
        )?;
        writeln!(f, "{}", "-".repeat(SUMMARY_RULE_WIDTH))?;
        for row in self.0 {
            writeln!(
                f,
                "{:<30} {:>10}    {}     {:>3}      {}",
                row.name,
                group_thousands(row.vertices),
                if row.skins > 0 { "YES" } else { "NO " },
                row.animations,
                row.morph_targets
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for SingleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "=== MODEL: {} ===", self.path)?;
        writeln!(f, "Meshes: {}", self.mesh_count)?;
        writeln!(f, "Skins: {}", self.skin_count)?;
        writeln!(f, "Animations: {}", self.animation_names.len())?;
        for name in &self.animation_names {
            writeln!(f, " - {name}")?;
        }
        if let Some(bones) = &self.first_skin_bones {
            writeln!(f)?;
            writeln!(f, "Bones: {}", bones.len())?;
            for bone in bones.iter().take(10) {
                writeln!(f, " - {bone}")?;
            }
        }
        Ok(())
    }
}
