//! Canonical key and text forms for master-data fields.
//!
//! Every comparison between a source value and a stored value goes through
//! these functions. They are total: an absent value becomes the empty string,
//! which callers treat as "missing".

use serde::Serialize;

/// Article id: hyphens and underscores removed, then trimmed, case preserved.
pub fn article_id(raw: Option<&str>) -> String {
    strip_separators(raw.unwrap_or_default()).trim().to_string()
}

/// Brand id: trimmed and uppercased.
pub fn brand_id(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_uppercase()
}

/// Category id: lowercased, hyphens and underscores removed, then trimmed.
pub fn category_id(raw: Option<&str>) -> String {
    strip_separators(&raw.unwrap_or_default().to_lowercase())
        .trim()
        .to_string()
}

/// Cost-center id: trimmed; anything that is not purely decimal digits is
/// treated as missing.
pub fn costcenter_id(raw: Option<&str>) -> String {
    let trimmed = raw.unwrap_or_default().trim();
    if trimmed.chars().all(|character| character.is_ascii_digit()) {
        trimmed.to_string()
    } else {
        String::new()
    }
}

pub fn text(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_string()
}

fn strip_separators(value: &str) -> String {
    value
        .chars()
        .filter(|character| *character != '-' && *character != '_')
        .collect()
}

/// Normalizer selector carried by entity descriptors.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyNormalizer {
    Article,
    Brand,
    Category,
    CostCenter,
    Text,
}

impl KeyNormalizer {
    pub fn apply(self, raw: Option<&str>) -> String {
        match self {
            Self::Article => article_id(raw),
            Self::Brand => brand_id(raw),
            Self::Category => category_id(raw),
            Self::CostCenter => costcenter_id(raw),
            Self::Text => text(raw),
        }
    }
}
