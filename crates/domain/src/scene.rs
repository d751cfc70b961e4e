//! Scene generation state and the materials a scene references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{MaterialId, SceneId};

/// Status of one generated artifact (image or video) of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    #[default]
    None,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactStatus::None => "none",
            ArtifactStatus::Generating => "generating",
            ArtifactStatus::Done => "done",
            ArtifactStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ArtifactStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(ArtifactStatus::None),
            "generating" => Ok(ArtifactStatus::Generating),
            "done" => Ok(ArtifactStatus::Done),
            "failed" => Ok(ArtifactStatus::Failed),
            other => Err(DomainError::parse(format!("Unknown artifact status: {other}"))),
        }
    }
}

/// Camera and lighting preset for a generated scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualStyle {
    #[default]
    Cinematic,
    Studio,
    Lifestyle,
    Orbit,
    Editorial,
}

impl VisualStyle {
    pub const ALL: [VisualStyle; 5] = [
        VisualStyle::Cinematic,
        VisualStyle::Studio,
        VisualStyle::Lifestyle,
        VisualStyle::Orbit,
        VisualStyle::Editorial,
    ];

    /// Camera movement and lighting directive opening a video prompt.
    pub fn video_directive(&self) -> &'static str {
        match self {
            VisualStyle::Cinematic => {
                "Slow cinematic dolly-in toward the product with a shallow depth of field. \
                 Warm key light from the left, soft rim light separating the product from the background."
            }
            VisualStyle::Studio => {
                "Locked-off camera with a gentle push-in. Even high-key studio lighting \
                 on a seamless backdrop, soft shadows beneath the product."
            }
            VisualStyle::Lifestyle => {
                "Handheld camera drifting naturally around the scene. Daylight through a window, \
                 lived-in surroundings that keep the product as the focal point."
            }
            VisualStyle::Orbit => {
                "Smooth 180-degree orbit around the product at eye level. \
                 Consistent three-point lighting that keeps reflections stable during the move."
            }
            VisualStyle::Editorial => {
                "Static wide frame followed by a slow tilt up revealing the product. \
                 Directional hard light with crisp shadows, magazine editorial look."
            }
        }
    }

    /// Framing directive used for still images.
    pub fn image_directive(&self) -> &'static str {
        match self {
            VisualStyle::Cinematic => "Cinematic wide shot, shallow depth of field, warm key light.",
            VisualStyle::Studio => "Clean studio product shot on a seamless backdrop, high-key lighting.",
            VisualStyle::Lifestyle => "Natural lifestyle setting in daylight, product in real use.",
            VisualStyle::Orbit => "Three-quarter hero angle with three-point lighting.",
            VisualStyle::Editorial => "Editorial composition with hard directional light and crisp shadows.",
        }
    }
}

impl fmt::Display for VisualStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VisualStyle::Cinematic => "cinematic",
            VisualStyle::Studio => "studio",
            VisualStyle::Lifestyle => "lifestyle",
            VisualStyle::Orbit => "orbit",
            VisualStyle::Editorial => "editorial",
        };
        write!(f, "{s}")
    }
}

impl FromStr for VisualStyle {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VisualStyle::ALL
            .into_iter()
            .find(|style| style.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("Unknown visual style: {s}")))
    }
}

/// One named property of a material, e.g. `color: navy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialProperty {
    pub name: String,
    pub value: String,
}

/// A user-supplied reference material attached to a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    #[serde(default)]
    pub id: MaterialId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub properties: Vec<MaterialProperty>,
    /// Path of the reference image relative to the file store root
    #[serde(default)]
    pub image_path: Option<String>,
    /// Canvas artwork that must be reproduced verbatim
    #[serde(default)]
    pub is_motif: bool,
}

impl Material {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: MaterialId::new(),
            name: name.into(),
            category: category.into(),
            properties: Vec::new(),
            image_path: None,
            is_motif: false,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push(MaterialProperty {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_image(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn as_motif(mut self) -> Self {
        self.is_motif = true;
        self
    }

    /// `name (category): prop: value, prop: value`
    pub fn describe(&self) -> String {
        let mut line = format!("{} ({})", self.name, self.category);
        if !self.properties.is_empty() {
            let props: Vec<String> = self
                .properties
                .iter()
                .map(|p| format!("{}: {}", p.name, p.value))
                .collect();
            line.push_str(": ");
            line.push_str(&props.join(", "));
        }
        line
    }
}

/// Generation state of a scene as held by the scene store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub image_status: ArtifactStatus,
    pub video_status: ArtifactStatus,
    pub image_path: Option<String>,
    pub video_path: Option<String>,
    pub enriched_prompt: Option<String>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SceneId::new(),
            name: name.into(),
            image_status: ArtifactStatus::None,
            video_status: ArtifactStatus::None,
            image_path: None,
            video_path: None,
            enriched_prompt: None,
            materials: Vec::new(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.materials.push(material);
        self
    }

    /// Distinct material categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for material in &self.materials {
            if !seen.iter().any(|c| c == &material.category) {
                seen.push(material.category.clone());
            }
        }
        seen
    }

    pub fn motif_paths(&self) -> Vec<String> {
        self.materials
            .iter()
            .filter(|m| m.is_motif)
            .filter_map(|m| m.image_path.clone())
            .collect()
    }

    /// Where the generated video of a scene is stored.
    pub fn video_artifact_path(id: SceneId) -> String {
        format!("videos/scene_{id}.mp4")
    }

    /// Where the generated image of a scene is stored.
    pub fn image_artifact_path(id: SceneId, extension: &str) -> String {
        format!("images/scene_{id}.{extension}")
    }
}
