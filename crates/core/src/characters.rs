//! Character sub-request resolution.
//!
//! Builds the ordered list of per-character prompts from the indexed
//! `角色{i}正面词条 / 角色{i}负面词条 / 角色{i}位置` keys and decides the
//! character-partition flag when the caller left it unset.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::tokenizer::{ParamKey, Tokens, MAX_CHARACTERS};

// ---------------------------------------------------------------------------
// GridCell
// ---------------------------------------------------------------------------

/// A cell on the 5×5 placement grid, written `A1`..`E5`.
///
/// The letter selects the horizontal band and the digit the vertical one;
/// [`center`](Self::center) maps both onto normalized `0.1..0.9` coordinates
/// in steps of `0.2`, which is what the backend's character-zone API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct GridCell {
    letter: char,
    digit: u8,
}

/// Default placement when a character carries no `位置` key: grid center.
pub const DEFAULT_CELL: GridCell = GridCell {
    letter: 'C',
    digit: 3,
};

impl GridCell {
    /// Parse a cell spelling. The letter is case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        let mut chars = value.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let digit = chars.next()?.to_digit(10)? as u8;
        if chars.next().is_some() || !('A'..='E').contains(&letter) || !(1..=5).contains(&digit) {
            return None;
        }
        Some(Self { letter, digit })
    }

    /// Normalized `(x, y)` center of this cell.
    pub fn center(&self) -> (f64, f64) {
        let x = 0.1 + 0.2 * (self.letter as u8 - b'A') as f64;
        let y = 0.1 + 0.2 * (self.digit - 1) as f64;
        (x, y)
    }
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.letter, self.digit)
    }
}

impl From<GridCell> for String {
    fn from(cell: GridCell) -> Self {
        cell.to_string()
    }
}

impl TryFrom<String> for GridCell {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid grid cell: {value}"))
    }
}

// ---------------------------------------------------------------------------
// CharacterSpec
// ---------------------------------------------------------------------------

/// One validated character sub-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSpec {
    /// Slot index, `1..=5`. Also the rendering order.
    pub index: u8,
    pub prompt: String,
    /// Empty when no per-character negative was given.
    pub negative: String,
    pub position: GridCell,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Build the ordered character list from the token map.
///
/// A character is *defined* iff its prompt key is present and non-empty; a
/// negative or position key without the prompt key is an error rather than a
/// silently empty character.
pub fn resolve_characters(tokens: &Tokens) -> Result<Vec<CharacterSpec>, RequestError> {
    let mut characters = Vec::new();

    for index in 1..=MAX_CHARACTERS {
        let prompt = tokens.get(ParamKey::CharPrompt(index));
        match prompt {
            None => {
                if tokens.contains(ParamKey::CharNegative(index))
                    || tokens.contains(ParamKey::CharPosition(index))
                {
                    return Err(RequestError::validation(
                        format!("角色{index}正面词条"),
                        format!("required when 角色{index}负面词条 or 角色{index}位置 is given"),
                    ));
                }
            }
            Some("") => {
                return Err(RequestError::validation(
                    format!("角色{index}正面词条"),
                    "must not be empty",
                ));
            }
            Some(prompt) => {
                let position = match tokens.get(ParamKey::CharPosition(index)) {
                    None => DEFAULT_CELL,
                    Some(raw) => GridCell::parse(raw).ok_or_else(|| {
                        RequestError::validation(
                            format!("角色{index}位置"),
                            format!("must be a grid cell A1..E5 (got '{raw}')"),
                        )
                    })?,
                };
                characters.push(CharacterSpec {
                    index,
                    prompt: prompt.to_string(),
                    negative: tokens
                        .get(ParamKey::CharNegative(index))
                        .unwrap_or_default()
                        .to_string(),
                    position,
                });
            }
        }
    }

    Ok(characters)
}

/// Resolve the character-partition flag.
///
/// An explicit caller value always wins; otherwise partitioning is off for
/// zero or one character and on for two or more.
pub fn resolve_partition(explicit: Option<bool>, character_count: usize) -> bool {
    explicit.unwrap_or(character_count > 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::tokenizer::tokenize;

    // -- GridCell --

    #[test]
    fn parses_valid_cells_case_insensitively() {
        assert_eq!(GridCell::parse("A1"), Some(GridCell { letter: 'A', digit: 1 }));
        assert_eq!(GridCell::parse("e5"), Some(GridCell { letter: 'E', digit: 5 }));
    }

    #[test]
    fn rejects_out_of_grid_cells() {
        assert_eq!(GridCell::parse("F1"), None);
        assert_eq!(GridCell::parse("A6"), None);
        assert_eq!(GridCell::parse("A0"), None);
        assert_eq!(GridCell::parse("A12"), None);
        assert_eq!(GridCell::parse(""), None);
    }

    #[test]
    fn default_cell_is_grid_center() {
        assert_eq!(DEFAULT_CELL.center(), (0.5, 0.5));
    }

    #[test]
    fn corner_cells_map_to_band_centers() {
        assert_eq!(GridCell::parse("A1").unwrap().center(), (0.1, 0.1));
        assert_eq!(GridCell::parse("E5").unwrap().center(), (0.9, 0.9));
        assert_eq!(GridCell::parse("B4").unwrap().center(), (0.3, 0.7));
    }

    #[test]
    fn display_round_trips() {
        let cell = GridCell::parse("d2").unwrap();
        assert_eq!(cell.to_string(), "D2");
        assert_eq!(GridCell::parse(&cell.to_string()), Some(cell));
    }

    // -- resolve_characters --

    #[test]
    fn no_character_keys_yields_empty_list() {
        let tokens = tokenize("正面词条:<solo scene>").unwrap();
        assert!(resolve_characters(&tokens).unwrap().is_empty());
    }

    #[test]
    fn characters_come_back_in_index_order() {
        let tokens = tokenize(
            "正面词条:<duo> 角色3正面词条:<knight> 角色1正面词条:<mage> 角色1位置:<a1>",
        )
        .unwrap();
        let chars = resolve_characters(&tokens).unwrap();
        assert_eq!(chars.len(), 2);
        assert_eq!(chars[0].index, 1);
        assert_eq!(chars[0].prompt, "mage");
        assert_eq!(chars[0].position.to_string(), "A1");
        assert_eq!(chars[1].index, 3);
        assert_eq!(chars[1].position, DEFAULT_CELL);
    }

    #[test]
    fn negative_without_prompt_is_rejected() {
        let tokens = tokenize("正面词条:<x> 角色2负面词条:<blurry>").unwrap();
        let err = resolve_characters(&tokens).unwrap_err();
        assert_matches!(err, RequestError::Validation { field, .. } if field == "角色2正面词条");
    }

    #[test]
    fn position_without_prompt_is_rejected() {
        let tokens = tokenize("正面词条:<x> 角色4位置:<C3>").unwrap();
        assert!(resolve_characters(&tokens).is_err());
    }

    #[test]
    fn empty_character_prompt_is_rejected() {
        let tokens = tokenize("正面词条:<x> 角色1正面词条:<>").unwrap();
        let err = resolve_characters(&tokens).unwrap_err();
        assert_matches!(err, RequestError::Validation { reason, .. } if reason.contains("empty"));
    }

    #[test]
    fn invalid_position_names_the_character() {
        let tokens = tokenize("正面词条:<x> 角色1正面词条:<girl> 角色1位置:<Z9>").unwrap();
        let err = resolve_characters(&tokens).unwrap_err();
        assert_matches!(err, RequestError::Validation { field, .. } if field == "角色1位置");
    }

    // -- resolve_partition --

    #[test]
    fn partition_defaults_off_for_single_character() {
        assert!(!resolve_partition(None, 0));
        assert!(!resolve_partition(None, 1));
    }

    #[test]
    fn partition_defaults_on_for_multiple_characters() {
        assert!(resolve_partition(None, 2));
        assert!(resolve_partition(None, 5));
    }

    #[test]
    fn explicit_partition_value_always_wins() {
        assert!(resolve_partition(Some(true), 1));
        assert!(!resolve_partition(Some(false), 4));
    }
}
