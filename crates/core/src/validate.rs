//! Field validation and normalization.
//!
//! Consumes the tokenizer's mapping and produces a canonical
//! [`Request`], applying the documented defaults, the conditional rules
//! (quality-word injection, furry marker, character partitioning, image
//! reference mutual exclusion), and range checks. Every failure is scoped to
//! the offending field so the requester sees exactly what to fix.

use rand::Rng;

use crate::characters::{resolve_characters, resolve_partition};
use crate::error::RequestError;
use crate::presets;
use crate::request::{Origin, Request, Requester, Resolution, Sampler};
use crate::tokenizer::{tokenize, ParamKey, Tokens};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_STEPS: u32 = 28;
pub const MAX_STEPS: u32 = 28;
pub const DEFAULT_GUIDANCE: f64 = 5.0;
pub const DEFAULT_CFG_RESCALE: f64 = 0.0;
pub const DEFAULT_BASE_IMAGE_STRENGTH: f64 = 0.7;
pub const DEFAULT_BASE_IMAGE_NOISE: f64 = 0.0;
pub const MAX_BASE_IMAGE_NOISE: f64 = 0.99;
pub const DEFAULT_CHAR_REFERENCE_STRENGTH: f64 = 1.0;

/// Range from which validation-time random seeds are drawn.
const SEED_RANGE: std::ops::RangeInclusive<u64> = 1_000_000_000..=9_999_999_999;

// ---------------------------------------------------------------------------
// Policy and context
// ---------------------------------------------------------------------------

/// Deployment-level knobs the validator consults.
///
/// Loaded from configuration by the API layer; defaults mirror the built-in
/// catalog so tests can run without any configuration at all.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Model allow-list. Commands naming anything else are rejected.
    pub models: Vec<String>,
    /// Model used when the command omits `模型`.
    pub default_model: String,
    /// Quality phrases appended by quality-word injection.
    pub quality_words: Vec<String>,
    /// Configured negative-prompt preset; falls back to the built-in Heavy
    /// preset when empty.
    pub negative_preset: Option<String>,
    /// Force quality-word injection regardless of the per-request flag.
    pub always_add_quality: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            models: presets::MODELS.iter().map(|m| m.to_string()).collect(),
            default_model: presets::DEFAULT_MODEL.to_string(),
            quality_words: presets::DEFAULT_QUALITY_WORDS
                .iter()
                .map(|w| w.to_string())
                .collect(),
            negative_preset: None,
            always_add_quality: false,
        }
    }
}

/// Per-message context: who asked, from where, with which attachments.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub requester: Requester,
    pub origin: Origin,
    /// Ordered opaque image references; command image indices are 1-based
    /// positions in this list.
    pub attachments: Vec<String>,
}

/// A validated command plus the keyless-fallback flag, so callers can tell
/// the requester the whole message was taken as the prompt.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub request: Request,
    pub no_keys_fallback: bool,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Tokenize and validate raw command text in one step.
pub fn parse_request(
    text: &str,
    ctx: RequestContext,
    policy: &Policy,
) -> Result<ParsedCommand, RequestError> {
    let tokens = tokenize(text)?;
    let no_keys_fallback = tokens.no_keys_found;
    let request = validate(&tokens, ctx, policy)?;
    Ok(ParsedCommand {
        request,
        no_keys_fallback,
    })
}

/// Validate a token mapping into a canonical [`Request`].
pub fn validate(
    tokens: &Tokens,
    ctx: RequestContext,
    policy: &Policy,
) -> Result<Request, RequestError> {
    let mut positive_prompt = match tokens.get(ParamKey::PositivePrompt) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => return Err(RequestError::validation("正面词条", "required")),
    };

    let model = match tokens.get(ParamKey::Model) {
        None | Some("") => policy.default_model.clone(),
        Some(m) => {
            if !policy.models.iter().any(|allowed| allowed == m) {
                return Err(RequestError::validation(
                    "模型",
                    format!("must be one of: {}", policy.models.join(", ")),
                ));
            }
            m.to_string()
        }
    };

    // Negative-prompt chain: explicit value (an explicit empty `负面词条:<>`
    // counts and stays empty) → configured preset → built-in Heavy preset.
    let negative_prompt = match tokens.get(ParamKey::NegativePrompt) {
        Some(explicit) => explicit.to_string(),
        None => match policy.negative_preset.as_deref() {
            Some(preset) if !preset.is_empty() => preset.to_string(),
            _ => presets::negative_preset(&model, presets::PRESET_HEAVY).to_string(),
        },
    };

    let furry_mode = parse_bool(tokens, ParamKey::FurryMode, false)?;
    if furry_mode && !positive_prompt.starts_with(presets::FURRY_MARKER) {
        positive_prompt = format!("{}, {positive_prompt}", presets::FURRY_MARKER);
    }

    let add_quality_words = parse_bool(tokens, ParamKey::AddQualityWords, false)?;
    if add_quality_words || policy.always_add_quality {
        inject_quality_words(&mut positive_prompt, &policy.quality_words);
    }

    let resolution = match tokens.get(ParamKey::Resolution) {
        None | Some("") => Resolution::Portrait,
        Some(raw) => Resolution::from_command(raw).ok_or_else(|| {
            RequestError::validation(
                "分辨率",
                format!("must be one of: {}", Resolution::ACCEPTED.join("/")),
            )
        })?,
    };

    let steps = parse_u32_range(tokens, ParamKey::Steps, DEFAULT_STEPS, 1, MAX_STEPS)?;
    let guidance = parse_f64_range(tokens, ParamKey::Guidance, DEFAULT_GUIDANCE, 0.0, 10.0)?;
    let cfg_rescale = parse_f64_range(tokens, ParamKey::CfgRescale, DEFAULT_CFG_RESCALE, 0.0, 1.0)?;
    let seed = parse_seed(tokens)?;

    let sampler = match tokens.get(ParamKey::Sampler) {
        None | Some("") => Sampler::KEulerAncestral,
        Some(raw) => Sampler::from_wire(raw).ok_or_else(|| {
            RequestError::validation(
                "采样器",
                format!("must be one of: {}", Sampler::ACCEPTED.join(", ")),
            )
        })?,
    };

    let base_image_ref = parse_image_index(tokens, ParamKey::BaseImage, &ctx.attachments)?;
    let base_image_strength = parse_f64_range(
        tokens,
        ParamKey::BaseImageStrength,
        DEFAULT_BASE_IMAGE_STRENGTH,
        0.0,
        1.0,
    )?;
    let base_image_noise = parse_f64_range(
        tokens,
        ParamKey::BaseImageNoise,
        DEFAULT_BASE_IMAGE_NOISE,
        0.0,
        MAX_BASE_IMAGE_NOISE,
    )?;

    let char_reference_ref = parse_image_index(tokens, ParamKey::CharReference, &ctx.attachments)?;
    let char_reference_strength = parse_f64_range(
        tokens,
        ParamKey::CharReferenceStrength,
        DEFAULT_CHAR_REFERENCE_STRENGTH,
        0.0,
        1.0,
    )?;
    let style_aware = parse_bool(tokens, ParamKey::StyleAware, false)?;

    // A base image and a character reference drive the same conditioning
    // slot upstream; refusing the combination beats silently dropping one.
    if base_image_ref.is_some() && char_reference_ref.is_some() {
        return Err(RequestError::validation(
            "角色参考",
            "cannot be combined with 底图; provide one or the other",
        ));
    }

    let characters = resolve_characters(tokens)?;
    let char_partition = resolve_partition(
        parse_bool_opt(tokens, ParamKey::CharPartition)?,
        characters.len(),
    );

    Ok(Request {
        positive_prompt,
        negative_prompt,
        resolution,
        steps,
        guidance,
        cfg_rescale,
        seed,
        sampler,
        model,
        furry_mode,
        add_quality_words,
        base_image_ref,
        base_image_strength,
        base_image_noise,
        char_partition,
        characters,
        char_reference_ref,
        char_reference_strength,
        style_aware,
        requester: ctx.requester,
        origin: ctx.origin,
        attachments: ctx.attachments,
    })
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

/// Append each quality phrase not already present (case-insensitive
/// substring check), preserving order and never duplicating.
fn inject_quality_words(prompt: &mut String, quality_words: &[String]) {
    let mut lowered = prompt.to_lowercase();
    for word in quality_words {
        if !lowered.contains(&word.to_lowercase()) {
            prompt.push_str(", ");
            prompt.push_str(word);
            lowered.push_str(", ");
            lowered.push_str(&word.to_lowercase());
        }
    }
}

fn parse_bool(tokens: &Tokens, key: ParamKey, default: bool) -> Result<bool, RequestError> {
    Ok(parse_bool_opt(tokens, key)?.unwrap_or(default))
}

/// Tri-state boolean: `None` when the key is absent or empty, so callers can
/// distinguish "unset" from an explicit value (character partitioning needs
/// this).
fn parse_bool_opt(tokens: &Tokens, key: ParamKey) -> Result<Option<bool>, RequestError> {
    match tokens.get(key) {
        None | Some("") => Ok(None),
        Some(raw) => match raw {
            "是" | "true" | "True" | "1" | "yes" | "YES" => Ok(Some(true)),
            "否" | "false" | "False" | "0" | "no" | "NO" => Ok(Some(false)),
            _ => Err(RequestError::validation(
                key.command_key(),
                format!("must be 是/否 (got '{raw}')"),
            )),
        },
    }
}

fn parse_u32_range(
    tokens: &Tokens,
    key: ParamKey,
    default: u32,
    min: u32,
    max: u32,
) -> Result<u32, RequestError> {
    match tokens.get(key) {
        None | Some("") => Ok(default),
        Some(raw) => {
            let value: u32 = raw.parse().map_err(|_| {
                RequestError::validation(key.command_key(), format!("must be an integer (got '{raw}')"))
            })?;
            if !(min..=max).contains(&value) {
                return Err(RequestError::validation(
                    key.command_key(),
                    format!("must be between {min} and {max} (got {value})"),
                ));
            }
            Ok(value)
        }
    }
}

fn parse_f64_range(
    tokens: &Tokens,
    key: ParamKey,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, RequestError> {
    match tokens.get(key) {
        None | Some("") => Ok(default),
        Some(raw) => {
            let value: f64 = raw.parse().map_err(|_| {
                RequestError::validation(key.command_key(), format!("must be a number (got '{raw}')"))
            })?;
            if !(min..=max).contains(&value) {
                return Err(RequestError::validation(
                    key.command_key(),
                    format!("must be between {min} and {max} (got {raw})"),
                ));
            }
            Ok(value)
        }
    }
}

/// Seed: absent, empty, `随机`, or `random` draws a fresh random seed now,
/// at validation time, so the value shown to the requester is the value the
/// backend receives.
fn parse_seed(tokens: &Tokens) -> Result<u64, RequestError> {
    match tokens.get(ParamKey::Seed) {
        None | Some("") => Ok(rand::rng().random_range(SEED_RANGE)),
        Some(raw) if raw == "随机" || raw.eq_ignore_ascii_case("random") => {
            Ok(rand::rng().random_range(SEED_RANGE))
        }
        Some(raw) => raw.parse().map_err(|_| {
            RequestError::validation("种子", format!("must be an integer or 随机 (got '{raw}')"))
        }),
    }
}

/// Resolve a 1-based image index against the attached image list, returning
/// the 0-based index.
fn parse_image_index(
    tokens: &Tokens,
    key: ParamKey,
    attachments: &[String],
) -> Result<Option<usize>, RequestError> {
    match tokens.get(key) {
        None | Some("") => Ok(None),
        Some(raw) => {
            let index: usize = raw.parse().map_err(|_| {
                RequestError::validation(
                    key.command_key(),
                    format!("must be an image number (got '{raw}')"),
                )
            })?;
            if index == 0 || index > attachments.len() {
                return Err(RequestError::validation(
                    key.command_key(),
                    format!(
                        "image {index} out of range: {} image(s) attached",
                        attachments.len()
                    ),
                ));
            }
            Ok(Some(index - 1))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext {
            requester: Requester {
                platform: "qq".to_string(),
                user_id: "10001".to_string(),
                nickname: None,
            },
            origin: Origin::Private,
            attachments: Vec::new(),
        }
    }

    fn ctx_with_images(n: usize) -> RequestContext {
        RequestContext {
            attachments: (0..n).map(|i| format!("image-{i}")).collect(),
            ..ctx()
        }
    }

    fn parse(text: &str) -> Result<ParsedCommand, RequestError> {
        parse_request(text, ctx(), &Policy::default())
    }

    // -- defaults --

    #[test]
    fn minimal_command_gets_documented_defaults() {
        let parsed = parse("正面词条:<a cat>").unwrap();
        let r = &parsed.request;
        assert!(!parsed.no_keys_fallback);
        assert_eq!(r.positive_prompt, "a cat");
        assert_eq!(r.resolution, Resolution::Portrait);
        assert_eq!(r.steps, 28);
        assert_eq!(r.guidance, 5.0);
        assert_eq!(r.cfg_rescale, 0.0);
        assert_eq!(r.sampler, Sampler::KEulerAncestral);
        assert_eq!(r.model, presets::DEFAULT_MODEL);
        assert!(!r.furry_mode);
        assert!(!r.add_quality_words);
        assert!(!r.style_aware);
        assert!(!r.char_partition);
        assert_eq!(r.base_image_ref, None);
        assert_eq!(r.base_image_strength, 0.7);
        assert_eq!(r.base_image_noise, 0.0);
        assert_eq!(r.char_reference_ref, None);
        assert_eq!(r.char_reference_strength, 1.0);
        assert!(r.characters.is_empty());
        // Default negative prompt is the built-in Heavy preset for the model.
        assert_eq!(
            r.negative_prompt,
            presets::negative_preset(presets::DEFAULT_MODEL, presets::PRESET_HEAVY)
        );
    }

    #[test]
    fn keyless_text_becomes_prompt_with_defaults() {
        let parsed = parse("a red fox in snow").unwrap();
        assert!(parsed.no_keys_fallback);
        assert_eq!(parsed.request.positive_prompt, "a red fox in snow");
        assert_eq!(parsed.request.steps, 28);
    }

    #[test]
    fn missing_prompt_is_a_field_error() {
        let err = parse("步数:<12>").unwrap_err();
        assert_matches!(err, RequestError::Validation { field, .. } if field == "正面词条");
    }

    // -- ranges --

    #[test]
    fn steps_over_maximum_rejected_with_range() {
        let err = parse("正面词条:<a cat> 步数:<30>").unwrap_err();
        assert_matches!(
            err,
            RequestError::Validation { field, reason }
                if field == "步数" && reason.contains("between 1 and 28")
        );
    }

    #[test]
    fn guidance_out_of_range_rejected() {
        assert!(parse("正面词条:<x> 指导系数:<10.5>").is_err());
        assert!(parse("正面词条:<x> 指导系数:<-1>").is_err());
        assert!(parse("正面词条:<x> 指导系数:<10>").is_ok());
    }

    #[test]
    fn base_noise_capped_below_one() {
        assert!(parse("正面词条:<x> 底图加噪强度:<0.99>").is_ok());
        let c = ctx_with_images(1);
        assert!(parse_request(
            "正面词条:<x> 底图:<1> 底图加噪强度:<0.99>",
            c.clone(),
            &Policy::default()
        )
        .is_ok());
        assert!(
            parse_request("正面词条:<x> 底图:<1> 底图加噪强度:<1.0>", c, &Policy::default())
                .is_err()
        );
    }

    #[test]
    fn non_numeric_number_rejected() {
        let err = parse("正面词条:<x> 指导系数:<high>").unwrap_err();
        assert_matches!(err, RequestError::Validation { reason, .. } if reason.contains("number"));
    }

    #[test]
    fn bad_boolean_rejected() {
        let err = parse("正面词条:<x> 是否有福瑞:<maybe>").unwrap_err();
        assert_matches!(err, RequestError::Validation { field, .. } if field == "是否有福瑞");
    }

    // -- enums --

    #[test]
    fn unknown_resolution_lists_choices() {
        let err = parse("正面词条:<x> 分辨率:<全景>").unwrap_err();
        assert_matches!(err, RequestError::Validation { reason, .. } if reason.contains("竖图"));
    }

    #[test]
    fn unknown_sampler_lists_choices() {
        let err = parse("正面词条:<x> 采样器:<ddim>").unwrap_err();
        assert_matches!(err, RequestError::Validation { reason, .. } if reason.contains("k_euler"));
    }

    #[test]
    fn unknown_model_rejected_against_allow_list() {
        let err = parse("正面词条:<x> 模型:<sdxl>").unwrap_err();
        assert_matches!(err, RequestError::Validation { field, .. } if field == "模型");
    }

    #[test]
    fn restricted_policy_narrows_model_allow_list() {
        let policy = Policy {
            models: vec![presets::MODEL_NAI3.to_string()],
            default_model: presets::MODEL_NAI3.to_string(),
            ..Policy::default()
        };
        let text = format!("正面词条:<x> 模型:<{}>", presets::MODEL_NAI45_FULL);
        assert!(parse_request(&text, ctx(), &policy).is_err());
    }

    // -- seed --

    #[test]
    fn explicit_seed_is_kept() {
        let parsed = parse("正面词条:<x> 种子:<424242>").unwrap();
        assert_eq!(parsed.request.seed, 424242);
    }

    #[test]
    fn random_seed_assigned_at_validation_time() {
        let a = parse("正面词条:<x> 种子:<随机>").unwrap().request.seed;
        let b = parse("正面词条:<x>").unwrap().request.seed;
        assert!(a >= 1_000_000_000);
        assert!(b >= 1_000_000_000);
    }

    #[test]
    fn bad_seed_rejected() {
        assert!(parse("正面词条:<x> 种子:<lucky>").is_err());
    }

    // -- prompt rewriting --

    #[test]
    fn furry_mode_prepends_marker_once() {
        let r = parse("正面词条:<a fox> 是否有福瑞:<是>").unwrap().request;
        assert_eq!(r.positive_prompt, "fur dataset, a fox");

        let again = parse("正面词条:<fur dataset, a fox> 是否有福瑞:<是>")
            .unwrap()
            .request;
        assert_eq!(again.positive_prompt, "fur dataset, a fox");
    }

    #[test]
    fn quality_words_appended_when_missing() {
        let r = parse("正面词条:<a fox> 添加质量词:<是>").unwrap().request;
        assert_eq!(r.positive_prompt, "a fox, best quality, masterpiece");
    }

    #[test]
    fn quality_words_not_duplicated_case_insensitively() {
        let r = parse("正面词条:<a fox, Best Quality> 添加质量词:<是>")
            .unwrap()
            .request;
        assert_eq!(r.positive_prompt, "a fox, Best Quality, masterpiece");
    }

    #[test]
    fn policy_can_force_quality_words() {
        let policy = Policy {
            always_add_quality: true,
            ..Policy::default()
        };
        let r = parse_request("正面词条:<a fox>", ctx(), &policy).unwrap().request;
        assert!(r.positive_prompt.contains("best quality"));
        assert!(!r.add_quality_words);
    }

    // -- negative-prompt chain --

    #[test]
    fn explicit_empty_negative_suppresses_presets() {
        let r = parse("正面词条:<x> 负面词条:<>").unwrap().request;
        assert_eq!(r.negative_prompt, "");
    }

    #[test]
    fn configured_preset_beats_builtin() {
        let policy = Policy {
            negative_preset: Some("lowres, bad hands".to_string()),
            ..Policy::default()
        };
        let r = parse_request("正面词条:<x>", ctx(), &policy).unwrap().request;
        assert_eq!(r.negative_prompt, "lowres, bad hands");
    }

    #[test]
    fn explicit_negative_beats_configured_preset() {
        let policy = Policy {
            negative_preset: Some("lowres".to_string()),
            ..Policy::default()
        };
        let r = parse_request("正面词条:<x> 负面词条:<blurry>", ctx(), &policy)
            .unwrap()
            .request;
        assert_eq!(r.negative_prompt, "blurry");
    }

    // -- image references --

    #[test]
    fn image_index_resolves_against_attachments() {
        let r = parse_request("正面词条:<x> 底图:<2>", ctx_with_images(3), &Policy::default())
            .unwrap()
            .request;
        assert_eq!(r.base_image_ref, Some(1));
    }

    #[test]
    fn image_index_out_of_range_names_index_and_count() {
        let err = parse_request("正面词条:<x> 底图:<3>", ctx_with_images(2), &Policy::default())
            .unwrap_err();
        assert_matches!(
            err,
            RequestError::Validation { reason, .. }
                if reason.contains("image 3") && reason.contains("2 image(s)")
        );
    }

    #[test]
    fn image_index_with_no_attachments_rejected() {
        assert!(parse("正面词条:<x> 角色参考:<1>").is_err());
    }

    #[test]
    fn base_image_and_char_reference_mutually_exclusive() {
        for (base, reference) in [(1, 2), (2, 1), (1, 1)] {
            let text = format!("正面词条:<x> 底图:<{base}> 角色参考:<{reference}>");
            let err =
                parse_request(&text, ctx_with_images(2), &Policy::default()).unwrap_err();
            assert_matches!(
                err,
                RequestError::Validation { reason, .. } if reason.contains("底图")
            );
        }
    }

    // -- character partitioning --

    #[test]
    fn single_character_defaults_to_unpartitioned() {
        let r = parse("正面词条:<x> 角色1正面词条:<mage>").unwrap().request;
        assert_eq!(r.characters.len(), 1);
        assert!(!r.char_partition);
    }

    #[test]
    fn two_characters_default_to_partitioned() {
        let r = parse("正面词条:<x> 角色1正面词条:<mage> 角色2正面词条:<knight>")
            .unwrap()
            .request;
        assert!(r.char_partition);
    }

    #[test]
    fn explicit_partition_flag_wins_over_count_rule() {
        let r = parse("正面词条:<x> 角色1正面词条:<mage> 角色是否分区:<是>")
            .unwrap()
            .request;
        assert!(r.char_partition);

        let r = parse(
            "正面词条:<x> 角色1正面词条:<mage> 角色2正面词条:<knight> 角色是否分区:<否>",
        )
        .unwrap()
        .request;
        assert!(!r.char_partition);
    }

    // -- round trip --

    #[test]
    fn command_text_round_trips_to_equal_request() {
        let text = "正面词条:<a fox, snow> 负面词条:<blurry> 分辨率:<横图> 步数:<20> \
                    指导系数:<6.5> 重采样系数:<0.3> 种子:<5550123> 采样器:<k_dpmpp_2m> \
                    是否有福瑞:<是> 添加质量词:<是> 角色1正面词条:<red fox> 角色1位置:<B2> \
                    角色2正面词条:<white owl> 角色是否分区:<是> 是否注意原画风:<否>";
        let first = parse(text).unwrap().request;
        let second = parse_request(&first.to_command_text(), ctx(), &Policy::default())
            .unwrap()
            .request;
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_preserves_image_references() {
        let c = ctx_with_images(2);
        let first = parse_request(
            "正面词条:<x> 角色参考:<2> 角色参考强度:<0.4>",
            c.clone(),
            &Policy::default(),
        )
        .unwrap()
        .request;
        let second = parse_request(&first.to_command_text(), c, &Policy::default())
            .unwrap()
            .request;
        assert_eq!(first, second);
    }
}
