//! Command-text tokenizer.
//!
//! Splits raw command text into `key → raw value` pairs in a single
//! left-to-right scan. The grammar is `Key:<value>` with either colon glyph
//! (`:` or `：`); values are delimited by `<` `>` and may span whitespace and
//! newlines. Text outside recognized pairs is ignored, except that input with
//! *zero* recognized pairs is treated wholesale as the positive prompt
//! (`no_keys_found`).
//!
//! Duplicate keys follow a deterministic rule: the last occurrence wins.

use std::collections::HashMap;

use crate::error::RequestError;

/// Highest character slot the grammar addresses (`角色1..角色5`).
pub const MAX_CHARACTERS: u8 = 5;

// ---------------------------------------------------------------------------
// ParamKey
// ---------------------------------------------------------------------------

/// Closed set of recognized command keys.
///
/// Anything outside this set (including character-indexed keys whose index
/// falls outside `1..=MAX_CHARACTERS`) is rejected with
/// [`RequestError::UnknownParameter`] rather than looked up dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    PositivePrompt,
    NegativePrompt,
    FurryMode,
    AddQualityWords,
    BaseImage,
    BaseImageStrength,
    BaseImageNoise,
    Resolution,
    Steps,
    Guidance,
    CfgRescale,
    Seed,
    Sampler,
    CharPartition,
    CharReference,
    CharReferenceStrength,
    StyleAware,
    Model,
    /// `角色{i}正面词条`, `i ∈ 1..=5`.
    CharPrompt(u8),
    /// `角色{i}负面词条`, `i ∈ 1..=5`.
    CharNegative(u8),
    /// `角色{i}位置`, `i ∈ 1..=5`.
    CharPosition(u8),
}

impl ParamKey {
    /// Resolve a raw key spelling to a [`ParamKey`].
    ///
    /// Fixed keys are matched first so that `角色参考` and `角色是否分区`
    /// are not mistaken for character-indexed keys.
    pub fn parse(key: &str) -> Result<Self, RequestError> {
        let fixed = match key {
            "正面词条" => Some(Self::PositivePrompt),
            "负面词条" => Some(Self::NegativePrompt),
            "是否有福瑞" => Some(Self::FurryMode),
            "添加质量词" => Some(Self::AddQualityWords),
            "底图" => Some(Self::BaseImage),
            "底图重绘强度" => Some(Self::BaseImageStrength),
            "底图加噪强度" => Some(Self::BaseImageNoise),
            "分辨率" => Some(Self::Resolution),
            "步数" => Some(Self::Steps),
            "指导系数" => Some(Self::Guidance),
            "重采样系数" => Some(Self::CfgRescale),
            "种子" => Some(Self::Seed),
            "采样器" => Some(Self::Sampler),
            "角色是否分区" => Some(Self::CharPartition),
            "角色参考" => Some(Self::CharReference),
            "角色参考强度" => Some(Self::CharReferenceStrength),
            "是否注意原画风" => Some(Self::StyleAware),
            "模型" => Some(Self::Model),
            _ => None,
        };
        if let Some(k) = fixed {
            return Ok(k);
        }

        if let Some(rest) = key.strip_prefix("角色") {
            let (index_part, ctor): (&str, fn(u8) -> Self) =
                if let Some(p) = rest.strip_suffix("正面词条") {
                    (p, Self::CharPrompt)
                } else if let Some(p) = rest.strip_suffix("负面词条") {
                    (p, Self::CharNegative)
                } else if let Some(p) = rest.strip_suffix("位置") {
                    (p, Self::CharPosition)
                } else {
                    return Err(RequestError::UnknownParameter(key.to_string()));
                };

            let index: u8 = index_part
                .parse()
                .map_err(|_| RequestError::UnknownParameter(key.to_string()))?;
            if !(1..=MAX_CHARACTERS).contains(&index) {
                return Err(RequestError::UnknownParameter(key.to_string()));
            }
            return Ok(ctor(index));
        }

        Err(RequestError::UnknownParameter(key.to_string()))
    }

    /// Command-grammar spelling of this key.
    pub fn command_key(&self) -> String {
        match self {
            Self::PositivePrompt => "正面词条".into(),
            Self::NegativePrompt => "负面词条".into(),
            Self::FurryMode => "是否有福瑞".into(),
            Self::AddQualityWords => "添加质量词".into(),
            Self::BaseImage => "底图".into(),
            Self::BaseImageStrength => "底图重绘强度".into(),
            Self::BaseImageNoise => "底图加噪强度".into(),
            Self::Resolution => "分辨率".into(),
            Self::Steps => "步数".into(),
            Self::Guidance => "指导系数".into(),
            Self::CfgRescale => "重采样系数".into(),
            Self::Seed => "种子".into(),
            Self::Sampler => "采样器".into(),
            Self::CharPartition => "角色是否分区".into(),
            Self::CharReference => "角色参考".into(),
            Self::CharReferenceStrength => "角色参考强度".into(),
            Self::StyleAware => "是否注意原画风".into(),
            Self::Model => "模型".into(),
            Self::CharPrompt(i) => format!("角色{i}正面词条"),
            Self::CharNegative(i) => format!("角色{i}负面词条"),
            Self::CharPosition(i) => format!("角色{i}位置"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Tokenizer output: the key/value mapping plus the keyless-input flag.
#[derive(Debug, Clone)]
pub struct Tokens {
    values: HashMap<ParamKey, String>,
    /// True when the input contained no recognized `Key:<...>` pair and the
    /// whole text was taken as the positive prompt. Non-fatal; callers may
    /// want to tell the requester the fallback kicked in.
    pub no_keys_found: bool,
}

impl Tokens {
    /// Raw value for `key`, if present (may be an explicitly empty string).
    pub fn get(&self, key: ParamKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: ParamKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Ascending character indices for which any `角色{i}*` key is present.
    pub fn character_indices(&self) -> Vec<u8> {
        let mut indices: Vec<u8> = (1..=MAX_CHARACTERS)
            .filter(|&i| {
                self.contains(ParamKey::CharPrompt(i))
                    || self.contains(ParamKey::CharNegative(i))
                    || self.contains(ParamKey::CharPosition(i))
            })
            .collect();
        indices.sort_unstable();
        indices
    }
}

// ---------------------------------------------------------------------------
// Tokenizing
// ---------------------------------------------------------------------------

/// Tokenize raw command text.
///
/// Full-width commas are normalized to ASCII before scanning so comma-
/// separated prompt fragments survive chat input methods. Values are
/// trimmed; an explicitly empty value (`Key:<>`) is kept as the empty
/// string, which is distinct from the key being absent.
pub fn tokenize(text: &str) -> Result<Tokens, RequestError> {
    let normalized = text.replace('，', ",");
    let trimmed = normalized.trim();

    let mut values: HashMap<ParamKey, String> = HashMap::new();
    let mut rest = trimmed;

    while !rest.is_empty() {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        // Read up to the end of the current whitespace-delimited word or the
        // first colon glyph, whichever comes first.
        let boundary = rest.find(|c: char| c.is_whitespace() || c == ':' || c == '：');
        let Some(idx) = boundary else {
            break; // trailing bare word
        };
        let boundary_char = rest[idx..].chars().next().expect("boundary char exists");

        if boundary_char.is_whitespace() {
            // Plain word, not a key.
            rest = &rest[idx + boundary_char.len_utf8()..];
            continue;
        }

        let key_str = &rest[..idx];
        let after_colon = &rest[idx + boundary_char.len_utf8()..];
        let after_ws = after_colon.trim_start();

        if key_str.is_empty() || !after_ws.starts_with('<') {
            // A colon without a `<` value is free text (e.g. a URL); skip the
            // remainder of this word.
            match rest[idx..].find(char::is_whitespace) {
                Some(ws) => rest = &rest[idx + ws..],
                None => break,
            }
            continue;
        }

        let key = ParamKey::parse(key_str)?;
        let value_body = &after_ws['<'.len_utf8()..];
        let Some(end) = value_body.find('>') else {
            return Err(RequestError::Parse(format!(
                "Unterminated '<' in value for key {key_str}"
            )));
        };
        values.insert(key, value_body[..end].trim().to_string());
        rest = &value_body[end + '>'.len_utf8()..];
    }

    let no_keys_found = values.is_empty();
    if no_keys_found && !trimmed.is_empty() {
        values.insert(ParamKey::PositivePrompt, trimmed.to_string());
    }

    Ok(Tokens {
        values,
        no_keys_found,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // -- key recognition --

    #[test]
    fn recognizes_both_colon_glyphs() {
        let tokens = tokenize("正面词条:<a cat> 步数：<12>").unwrap();
        assert_eq!(tokens.get(ParamKey::PositivePrompt), Some("a cat"));
        assert_eq!(tokens.get(ParamKey::Steps), Some("12"));
        assert!(!tokens.no_keys_found);
    }

    #[test]
    fn value_may_span_whitespace_and_newlines() {
        let tokens = tokenize("正面词条:<a cat,\nsitting on a mat> 种子:<7>").unwrap();
        assert_eq!(
            tokens.get(ParamKey::PositivePrompt),
            Some("a cat,\nsitting on a mat")
        );
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = tokenize("画风:<油画>").unwrap_err();
        assert_matches!(err, RequestError::UnknownParameter(k) if k == "画风");
    }

    #[test]
    fn character_key_out_of_range_is_rejected() {
        let err = tokenize("角色6正面词条:<girl>").unwrap_err();
        assert_matches!(err, RequestError::UnknownParameter(k) if k == "角色6正面词条");
    }

    #[test]
    fn character_key_without_index_is_rejected() {
        let err = tokenize("角色正面词条:<girl>").unwrap_err();
        assert_matches!(err, RequestError::UnknownParameter(_));
    }

    #[test]
    fn character_keys_parse_to_indexed_variants() {
        let tokens =
            tokenize("正面词条:<two> 角色1正面词条:<red fox> 角色1位置:<B2> 角色2正面词条:<owl>")
                .unwrap();
        assert_eq!(tokens.get(ParamKey::CharPrompt(1)), Some("red fox"));
        assert_eq!(tokens.get(ParamKey::CharPosition(1)), Some("B2"));
        assert_eq!(tokens.character_indices(), vec![1, 2]);
    }

    #[test]
    fn fixed_keys_win_over_character_prefix() {
        let tokens = tokenize("正面词条:<x> 角色是否分区:<是> 角色参考:<1>").unwrap();
        assert_eq!(tokens.get(ParamKey::CharPartition), Some("是"));
        assert_eq!(tokens.get(ParamKey::CharReference), Some("1"));
    }

    // -- bracket handling --

    #[test]
    fn unterminated_bracket_names_the_key() {
        let err = tokenize("正面词条:<a cat 步数").unwrap_err();
        assert_matches!(err, RequestError::Parse(msg) if msg.contains("正面词条"));
    }

    #[test]
    fn explicit_empty_value_is_kept() {
        let tokens = tokenize("正面词条:<a cat> 负面词条:<>").unwrap();
        assert_eq!(tokens.get(ParamKey::NegativePrompt), Some(""));
        assert!(tokens.contains(ParamKey::NegativePrompt));
    }

    // -- keyless fallback --

    #[test]
    fn keyless_input_becomes_positive_prompt() {
        let tokens = tokenize("a red fox in snow").unwrap();
        assert!(tokens.no_keys_found);
        assert_eq!(tokens.get(ParamKey::PositivePrompt), Some("a red fox in snow"));
    }

    #[test]
    fn colon_without_bracket_is_free_text() {
        let tokens = tokenize("look at https://example.com/cat now").unwrap();
        assert!(tokens.no_keys_found);
        assert_eq!(
            tokens.get(ParamKey::PositivePrompt),
            Some("look at https://example.com/cat now")
        );
    }

    #[test]
    fn empty_input_yields_no_prompt() {
        let tokens = tokenize("   ").unwrap();
        assert!(tokens.no_keys_found);
        assert_eq!(tokens.get(ParamKey::PositivePrompt), None);
    }

    // -- duplicates and normalization --

    #[test]
    fn duplicate_key_last_occurrence_wins() {
        let tokens = tokenize("正面词条:<first> 正面词条:<second>").unwrap();
        assert_eq!(tokens.get(ParamKey::PositivePrompt), Some("second"));
    }

    #[test]
    fn full_width_commas_are_normalized() {
        let tokens = tokenize("正面词条:<a cat，a hat>").unwrap();
        assert_eq!(tokens.get(ParamKey::PositivePrompt), Some("a cat,a hat"));
    }

    #[test]
    fn stray_text_between_pairs_is_ignored() {
        let tokens = tokenize("please 正面词条:<a cat> thanks 步数:<5>").unwrap();
        assert!(!tokens.no_keys_found);
        assert_eq!(tokens.get(ParamKey::PositivePrompt), Some("a cat"));
        assert_eq!(tokens.get(ParamKey::Steps), Some("5"));
    }
}
