//! Prompt composition for scene images and videos.
//!
//! Prompts are built from ordered fragments separated by blank lines: the
//! style directive, optional user direction, the material-fidelity clause
//! (only when materials are referenced) and, for images, the motif
//! display-mode directive.

use std::sync::Arc;
use vitrine_domain::{Material, MotifDisplayMode, VisualStyle};

use crate::infrastructure::ports::{ProviderError, ProviderPort};

/// System instruction used when optimizing a composed video prompt.
pub const VIDEO_OPTIMIZER_SYSTEM_PROMPT: &str = "You rewrite product video prompts for an \
image-to-video model. Keep the result under 150 words, written as one paragraph. Emphasize \
concrete camera movement (direction, speed, framing) and lighting. Preserve every material \
constraint verbatim: the products must look identical in every frame. Do not invent new \
objects, logos or text. Reply with the rewritten prompt only.";

const FRAGMENT_SEPARATOR: &str = "\n\n";

pub struct PromptComposer {
    provider: Arc<dyn ProviderPort>,
}

impl PromptComposer {
    pub fn new(provider: Arc<dyn ProviderPort>) -> Self {
        Self { provider }
    }

    /// Style directive, then user direction, then the material clause.
    pub fn compose_video_prompt(
        style: VisualStyle,
        user_prompt: Option<&str>,
        materials: &[Material],
    ) -> String {
        let mut fragments = vec![style.video_directive().to_string()];
        if let Some(direction) = user_direction(user_prompt) {
            fragments.push(format!("Additional direction: {direction}"));
        }
        if let Some(clause) = material_fidelity_clause(materials) {
            fragments.push(clause);
        }
        fragments.join(FRAGMENT_SEPARATOR)
    }

    pub fn compose_image_prompt(
        style: VisualStyle,
        user_prompt: Option<&str>,
        materials: &[Material],
        display_mode: Option<MotifDisplayMode>,
    ) -> String {
        let mut fragments = vec![style.image_directive().to_string()];
        if let Some(direction) = user_direction(user_prompt) {
            fragments.push(direction.to_string());
        }
        if let Some(clause) = material_fidelity_clause(materials) {
            fragments.push(clause);
        }
        if let Some(mode) = display_mode {
            fragments.push(display_mode_directive(mode).to_string());
        }
        fragments.join(FRAGMENT_SEPARATOR)
    }

    /// Rewrite a composed video prompt through the text model.
    pub async fn optimize_video_prompt(&self, composed: &str) -> Result<String, ProviderError> {
        self.provider
            .enrich_prompt(VIDEO_OPTIMIZER_SYSTEM_PROMPT, composed)
            .await
    }
}

fn user_direction(user_prompt: Option<&str>) -> Option<&str> {
    user_prompt.map(str::trim).filter(|p| !p.is_empty())
}

/// Lists each material and forbids changing it across camera or lighting
/// changes. `None` when no material is referenced.
pub fn material_fidelity_clause(materials: &[Material]) -> Option<String> {
    if materials.is_empty() {
        return None;
    }
    let mut clause = String::from(
        "Material fidelity: reproduce every referenced material exactly as supplied. \
         Do not alter colours, textures, patterns or proportions when the camera moves \
         or the lighting changes.",
    );
    for material in materials {
        clause.push_str("\n- ");
        clause.push_str(&material.describe());
    }
    Some(clause)
}

pub fn display_mode_directive(mode: MotifDisplayMode) -> &'static str {
    match mode {
        MotifDisplayMode::Template => {
            "Motif display: the artwork sits on a white border. Present it as a framed print \
             with the white margin visible, never stretched to the frame edges."
        }
        MotifDisplayMode::Stretched => {
            "Motif display: the artwork is a full-bleed canvas. Wrap it edge to edge \
             across the surface with no white margin."
        }
    }
}
