//! Model catalog: recognized model ids, per-model negative-prompt presets,
//! uc-preset indices, and `skip_cfg_above_sigma` values.
//!
//! The tables mirror the upstream NovelAI model generations. Lookups are
//! keyed by model id string so the catalog can grow without touching the
//! validator.

// ---------------------------------------------------------------------------
// Model ids
// ---------------------------------------------------------------------------

pub const MODEL_NAI45_FULL: &str = "nai-diffusion-4-5-full";
pub const MODEL_NAI45_CURATED: &str = "nai-diffusion-4-5-curated";
pub const MODEL_NAI4_FULL: &str = "nai-diffusion-4-full";
pub const MODEL_NAI4_CURATED_PREVIEW: &str = "nai-diffusion-4-curated-preview";
pub const MODEL_NAI3: &str = "nai-diffusion-3";
pub const MODEL_NAI3_FURRY: &str = "nai-diffusion-furry-3";

/// All model ids the service knows how to build payloads for.
pub const MODELS: &[&str] = &[
    MODEL_NAI45_FULL,
    MODEL_NAI45_CURATED,
    MODEL_NAI4_FULL,
    MODEL_NAI4_CURATED_PREVIEW,
    MODEL_NAI3,
    MODEL_NAI3_FURRY,
];

/// Model used when the command and the policy both leave it unspecified.
pub const DEFAULT_MODEL: &str = MODEL_NAI45_CURATED;

/// Check whether `model` is a member of the built-in catalog.
pub fn is_known_model(model: &str) -> bool {
    MODELS.contains(&model)
}

// ---------------------------------------------------------------------------
// Negative-prompt presets
// ---------------------------------------------------------------------------

/// Preset name applied when the requester gives no negative prompt and the
/// deployment configures none.
pub const PRESET_HEAVY: &str = "Heavy";

/// Built-in negative-prompt preset text for a model.
///
/// Returns an empty string for unknown model/preset combinations; callers
/// treat that the same as `"None"`.
pub fn negative_preset(model: &str, preset: &str) -> &'static str {
    match (model, preset) {
        (MODEL_NAI45_FULL, "Heavy") => {
            "lowres, artistic error, film grain, scan artifacts, worst quality, bad quality, \
             jpeg artifacts, very displeasing, chromatic aberration, dithering, halftone, \
             screentone, multiple views, logo, too many watermarks, negative space, blank page"
        }
        (MODEL_NAI45_FULL, "Light") => {
            "lowres, artistic error, scan artifacts, worst quality, bad quality, jpeg artifacts, \
             multiple views, very displeasing, too many watermarks, negative space, blank page"
        }
        (MODEL_NAI45_CURATED, "Heavy") => {
            "blurry, lowres, upscaled, artistic error, film grain, scan artifacts, worst quality, \
             bad quality, jpeg artifacts, very displeasing, chromatic aberration, halftone, \
             multiple views, logo, too many watermarks, negative space, blank page"
        }
        (MODEL_NAI45_CURATED, "Light") => {
            "blurry, lowres, upscaled, artistic error, scan artifacts, jpeg artifacts, logo, \
             too many watermarks, negative space, blank page"
        }
        (MODEL_NAI4_FULL, "Heavy") => {
            "blurry, lowres, error, film grain, scan artifacts, worst quality, bad quality, \
             jpeg artifacts, very displeasing, chromatic aberration, multiple views, logo, \
             white blank page, blank page"
        }
        (MODEL_NAI4_FULL, "Light") => {
            "blurry, lowres, error, worst quality, bad quality, jpeg artifacts, very displeasing, \
             white blank page, blank page"
        }
        (MODEL_NAI4_CURATED_PREVIEW, "Heavy") => {
            "blurry, lowres, error, film grain, scan artifacts, worst quality, bad quality, \
             jpeg artifacts, very displeasing, chromatic aberration, logo, dated, signature, \
             multiple views, white blank page, blank page"
        }
        (MODEL_NAI4_CURATED_PREVIEW, "Light") => {
            "blurry, lowres, error, worst quality, bad quality, jpeg artifacts, very displeasing, \
             logo, dated, signature, white blank page, blank page"
        }
        (MODEL_NAI3, "Heavy") => {
            "lowres, {bad}, error, fewer, extra, missing, worst quality, jpeg artifacts, \
             bad quality, watermark, unfinished, displeasing, chromatic aberration, signature, \
             extra digits, artistic error, username, scan, [abstract]"
        }
        (MODEL_NAI3, "Light") => {
            "lowres, jpeg artifacts, worst quality, watermark, blurry, very displeasing"
        }
        (MODEL_NAI3, "None") => "lowres",
        (MODEL_NAI3_FURRY, "Heavy") => {
            "{{worst quality}}, [displeasing], {unusual pupils}, guide lines, {{unfinished}}, \
             {bad}, url, artist name, {{tall image}}, mosaic, {sketch page}, comic panel, \
             impact (font), [dated], {logo}, ych, {what}, {distorted text}, repeated text, \
             {floating head}, {1994}, {widescreen}, absolutely everyone, sequence, \
             {compression artifacts}, hard translated, {cropped}, {commissioner name}, \
             unknown text, high contrast"
        }
        (MODEL_NAI3_FURRY, "Light") => {
            "{worst quality}, guide lines, unfinished, bad, url, tall image, widescreen, \
             compression artifacts, unknown text"
        }
        (MODEL_NAI3_FURRY, "None") => "lowres",
        _ => "",
    }
}

/// Numeric `ucPreset` index the backend expects for a model/preset pair.
pub fn uc_preset_index(model: &str, preset: &str) -> u32 {
    match (model, preset) {
        (_, "Heavy") => 0,
        (_, "Light") => 1,
        (MODEL_NAI45_FULL, "Furry Focus") => 2,
        (MODEL_NAI45_FULL, "Human Focus") => 3,
        (MODEL_NAI45_FULL, "None") => 4,
        (MODEL_NAI45_CURATED | MODEL_NAI3, "Human Focus") => 2,
        (MODEL_NAI45_CURATED | MODEL_NAI3, "None") => 3,
        (_, "None") => 2,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Sampling constants
// ---------------------------------------------------------------------------

/// Per-model `skip_cfg_above_sigma` value (variety boost threshold).
pub fn skip_cfg_above_sigma(model: &str) -> f64 {
    match model {
        MODEL_NAI45_FULL => 58.0,
        MODEL_NAI45_CURATED => 36.158893609242725,
        MODEL_NAI4_FULL => 18.254609533779934,
        MODEL_NAI4_CURATED_PREVIEW | MODEL_NAI3 | MODEL_NAI3_FURRY => 11.84515480302779,
        _ => 0.0,
    }
}

/// Quality phrases appended when quality-word injection is enabled and the
/// prompt does not already contain them.
pub const DEFAULT_QUALITY_WORDS: &[&str] = &["best quality", "masterpiece"];

/// Marker prepended to the positive prompt when furry mode is requested.
pub const FURRY_MARKER: &str = "fur dataset";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
