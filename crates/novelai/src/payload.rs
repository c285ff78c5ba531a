//! Canonical [`Request`] → NovelAI wire payload.
//!
//! The shape follows the upstream `/ai/generate-image` contract: a top-level
//! `input`/`model`/`action` plus a dense `parameters` object. Character
//! handling depends on the partition flag: partitioned characters become
//! v4 char-caption blocks with grid-cell centers, unpartitioned ones are
//! folded into the main prompt pair.

use atelier_core::presets;
use atelier_core::request::{Request, Sampler};
use serde_json::{json, Value};

/// Build the full JSON payload for a validated request.
pub fn build_payload(request: &Request) -> Value {
    let (width, height) = request.resolution.dimensions();

    let mut prompt = request.positive_prompt.clone();
    let mut negative = request.negative_prompt.clone();

    let partitioned = request.char_partition && !request.characters.is_empty();
    let mut v4_positive: Vec<Value> = Vec::new();
    let mut v4_negative: Vec<Value> = Vec::new();
    let mut character_prompts: Vec<Value> = Vec::new();

    if partitioned {
        for ch in &request.characters {
            let (x, y) = ch.position.center();
            let center = json!({ "x": x, "y": y });
            v4_positive.push(json!({ "char_caption": ch.prompt, "centers": [center] }));
            v4_negative.push(json!({ "char_caption": ch.negative, "centers": [center] }));
            character_prompts.push(json!({
                "prompt": ch.prompt,
                "uc": ch.negative,
                "center": center,
                "enabled": true,
            }));
        }
    } else {
        // Without zones the per-character prompts still contribute, merged
        // into the global pair.
        for ch in &request.characters {
            if !ch.prompt.is_empty() {
                push_fragment(&mut prompt, &ch.prompt);
            }
            if !ch.negative.is_empty() {
                push_fragment(&mut negative, &ch.negative);
            }
        }
    }

    let mut parameters = json!({
        "params_version": 3,
        "width": width,
        "height": height,
        "scale": request.guidance,
        "sampler": request.sampler.wire_name(),
        "steps": request.steps,
        "n_samples": 1,
        "ucPreset": presets::uc_preset_index(&request.model, presets::PRESET_HEAVY),
        "qualityToggle": request.add_quality_words,
        "autoSmea": false,
        "dynamic_thresholding": false,
        "controlnet_strength": 1,
        "legacy": false,
        "add_original_image": true,
        "cfg_rescale": request.cfg_rescale,
        "noise_schedule": "native",
        "legacy_v3_extend": false,
        "skip_cfg_above_sigma": presets::skip_cfg_above_sigma(&request.model),
        "use_coords": partitioned,
        "normalize_reference_strength_multiple": false,
        "use_order": true,
        "legacy_uc": false,
        "seed": request.seed,
        "characterPrompts": character_prompts,
        "negative_prompt": negative,
        "sm": false,
        "sm_dyn": false,
        "v4_prompt": {
            "caption": { "base_caption": prompt, "char_captions": v4_positive },
            "use_coords": partitioned,
            "use_order": true,
        },
        "v4_negative_prompt": {
            "caption": { "base_caption": negative, "char_captions": v4_negative },
            "legacy_uc": false,
        },
        "stream": "msgpack",
    });

    let params = parameters.as_object_mut().expect("parameters is an object");

    if request.sampler == Sampler::KEulerAncestral {
        params.insert("deliberate_euler_ancestral_bug".into(), json!(false));
        params.insert("prefer_brownian".into(), json!(true));
    }

    if let Some(idx) = request.char_reference_ref {
        let caption = if request.style_aware {
            "character&style"
        } else {
            "character"
        };
        params.insert(
            "director_reference_images".into(),
            json!([request.attachments[idx]]),
        );
        params.insert(
            "director_reference_descriptions".into(),
            json!([{
                "caption": { "base_caption": caption, "char_captions": [] },
                "legacy_uc": false,
            }]),
        );
        params.insert("director_reference_information_extracted".into(), json!([1]));
        params.insert(
            "director_reference_strength_values".into(),
            json!([request.char_reference_strength]),
        );
        params.insert(
            "director_reference_secondary_strength_values".into(),
            json!([(1.0 - request.char_reference_strength).max(0.0)]),
        );
    }

    let mut action = "generate";
    if let Some(idx) = request.base_image_ref {
        action = "img2img";
        params.insert("image".into(), json!(request.attachments[idx]));
        params.insert("strength".into(), json!(request.base_image_strength));
        params.insert("noise".into(), json!(request.base_image_noise));
        params.insert("extra_noise_seed".into(), json!(request.seed));
        params.insert("color_correct".into(), json!(false));
    }

    json!({
        "input": prompt,
        "model": request.model,
        "action": action,
        "parameters": parameters,
        "use_new_shared_trial": true,
    })
}

/// Append `fragment` to a comma-joined prompt string.
fn push_fragment(target: &mut String, fragment: &str) {
    if target.is_empty() {
        target.push_str(fragment);
    } else {
        target.push_str(", ");
        target.push_str(fragment);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
