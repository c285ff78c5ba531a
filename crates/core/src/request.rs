//! Canonical generation request model.
//!
//! A [`Request`] is produced by [`crate::validate`] and is immutable from
//! then on: every field is typed, range-checked, and defaulted, so the queue
//! and the backend payload builder never re-validate.

use serde::{Deserialize, Serialize};

use crate::characters::CharacterSpec;

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Output aspect preset. The command grammar names these 竖图/横图/方图.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Portrait,
    Landscape,
    Square,
}

impl Resolution {
    /// All accepted command-grammar spellings, for error messages.
    pub const ACCEPTED: &'static [&'static str] = &["竖图", "横图", "方图"];

    /// Parse a command-grammar spelling.
    pub fn from_command(value: &str) -> Option<Self> {
        match value {
            "竖图" => Some(Self::Portrait),
            "横图" => Some(Self::Landscape),
            "方图" => Some(Self::Square),
            _ => None,
        }
    }

    /// Command-grammar spelling (inverse of [`from_command`](Self::from_command)).
    pub fn command_key(&self) -> &'static str {
        match self {
            Self::Portrait => "竖图",
            Self::Landscape => "横图",
            Self::Square => "方图",
        }
    }

    /// Pixel dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Portrait => (832, 1216),
            Self::Landscape => (1216, 832),
            Self::Square => (1024, 1024),
        }
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Diffusion sampler allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    KEuler,
    KEulerAncestral,
    KDpmpp2sAncestral,
    KDpmpp2m,
    KDpmppSde,
    KDpmpp2mSde,
}

impl Sampler {
    /// All wire names, for error messages.
    pub const ACCEPTED: &'static [&'static str] = &[
        "k_euler",
        "k_euler_ancestral",
        "k_dpmpp_2s_ancestral",
        "k_dpmpp_2m",
        "k_dpmpp_sde",
        "k_dpmpp_2m_sde",
    ];

    /// Parse a wire name.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "k_euler" => Some(Self::KEuler),
            "k_euler_ancestral" => Some(Self::KEulerAncestral),
            "k_dpmpp_2s_ancestral" => Some(Self::KDpmpp2sAncestral),
            "k_dpmpp_2m" => Some(Self::KDpmpp2m),
            "k_dpmpp_sde" => Some(Self::KDpmppSde),
            "k_dpmpp_2m_sde" => Some(Self::KDpmpp2mSde),
            _ => None,
        }
    }

    /// Wire name sent to the backend and used by the command grammar.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::KEuler => "k_euler",
            Self::KEulerAncestral => "k_euler_ancestral",
            Self::KDpmpp2sAncestral => "k_dpmpp_2s_ancestral",
            Self::KDpmpp2m => "k_dpmpp_2m",
            Self::KDpmppSde => "k_dpmpp_sde",
            Self::KDpmpp2mSde => "k_dpmpp_2m_sde",
        }
    }
}

// ---------------------------------------------------------------------------
// Requester identity and origin
// ---------------------------------------------------------------------------

/// Who asked for the image. `platform` + `user_id` key the quota store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub platform: String,
    pub user_id: String,
    pub nickname: Option<String>,
}

/// Where the request came from. Group-origin admission denials are silent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    Private,
    Group { group_id: String },
}

impl Origin {
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Fully validated, defaulted generation request.
///
/// Handed by value to the queue; no shared mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub resolution: Resolution,
    pub steps: u32,
    pub guidance: f64,
    pub cfg_rescale: f64,
    /// Concrete seed, assigned at validation time when the command left it
    /// blank or said 随机/random.
    pub seed: u64,
    pub sampler: Sampler,
    pub model: String,
    pub furry_mode: bool,
    pub add_quality_words: bool,
    /// Zero-based index into `attachments` (the grammar is 1-based).
    pub base_image_ref: Option<usize>,
    pub base_image_strength: f64,
    pub base_image_noise: f64,
    /// Resolved character-partition flag (explicit value wins over the
    /// character-count rule).
    pub char_partition: bool,
    pub characters: Vec<CharacterSpec>,
    /// Zero-based index into `attachments`; mutually exclusive with
    /// `base_image_ref`.
    pub char_reference_ref: Option<usize>,
    pub char_reference_strength: f64,
    pub style_aware: bool,
    pub requester: Requester,
    pub origin: Origin,
    /// Ordered opaque image references attached to the triggering message.
    pub attachments: Vec<String>,
}

impl Request {
    /// Render the request back into `Key:<Value>` command text.
    ///
    /// Re-tokenizing and re-validating the result yields an equal `Request`
    /// (grammar round-trip), which is what the LLM front-end relies on when
    /// echoing canonicalized commands back to users.
    pub fn to_command_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let push = |parts: &mut Vec<String>, key: &str, value: &str| {
            parts.push(format!("{key}:<{value}>"));
        };

        push(&mut parts, "正面词条", &self.positive_prompt);
        push(&mut parts, "负面词条", &self.negative_prompt);
        push(&mut parts, "分辨率", self.resolution.command_key());
        push(&mut parts, "步数", &self.steps.to_string());
        push(&mut parts, "指导系数", &self.guidance.to_string());
        push(&mut parts, "重采样系数", &self.cfg_rescale.to_string());
        push(&mut parts, "种子", &self.seed.to_string());
        push(&mut parts, "采样器", self.sampler.wire_name());
        push(&mut parts, "模型", &self.model);
        push(&mut parts, "是否有福瑞", bool_word(self.furry_mode));
        push(&mut parts, "添加质量词", bool_word(self.add_quality_words));
        push(&mut parts, "是否注意原画风", bool_word(self.style_aware));
        push(&mut parts, "角色是否分区", bool_word(self.char_partition));

        push(&mut parts, "底图重绘强度", &self.base_image_strength.to_string());
        push(&mut parts, "底图加噪强度", &self.base_image_noise.to_string());
        push(&mut parts, "角色参考强度", &self.char_reference_strength.to_string());
        if let Some(idx) = self.base_image_ref {
            push(&mut parts, "底图", &(idx + 1).to_string());
        }
        if let Some(idx) = self.char_reference_ref {
            push(&mut parts, "角色参考", &(idx + 1).to_string());
        }
        for ch in &self.characters {
            push(&mut parts, &format!("角色{}正面词条", ch.index), &ch.prompt);
            if !ch.negative.is_empty() {
                push(&mut parts, &format!("角色{}负面词条", ch.index), &ch.negative);
            }
            push(&mut parts, &format!("角色{}位置", ch.index), &ch.position.to_string());
        }

        parts.join(" ")
    }
}

fn bool_word(v: bool) -> &'static str {
    if v {
        "是"
    } else {
        "否"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
