//! Per-entity configuration for the shared import and extraction engine.

use anyhow::{Result, bail};
use regex::Regex;

use crate::model::EntityType;
use crate::normalize::KeyNormalizer;

/// A stored column fed from one source field.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMapping {
    pub column: &'static str,
    pub source_field: &'static str,
    pub normalizer: KeyNormalizer,
    /// Keep only the first `n` characters after normalization.
    pub max_chars: Option<usize>,
    /// Substituted when the normalized value is empty.
    pub default_value: Option<&'static str>,
    /// Rows whose value is still empty after defaults are skipped.
    pub required: bool,
}

impl ColumnMapping {
    const fn new(column: &'static str, source_field: &'static str, normalizer: KeyNormalizer) -> Self {
        Self {
            column,
            source_field,
            normalizer,
            max_chars: None,
            default_value: None,
            required: true,
        }
    }

    const fn truncated(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    const fn defaulting_to(mut self, value: &'static str) -> Self {
        self.default_value = Some(value);
        self
    }

    const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn normalize(&self, raw: Option<&str>) -> String {
        let mut value = self.normalizer.apply(raw);
        if let Some(max_chars) = self.max_chars {
            value = value.chars().take(max_chars).collect();
        }
        if value.is_empty() {
            if let Some(default_value) = self.default_value {
                value = default_value.to_string();
            }
        }
        value
    }
}

#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub entity_type: EntityType,
    pub table_name: String,
    pub ledger_table_name: String,
    pub db_file_name: &'static str,
    pub id: ColumnMapping,
    pub text: ColumnMapping,
    pub extras: &'static [ColumnMapping],
}

const ARTICLE_EXTRAS: &[ColumnMapping] = &[
    ColumnMapping::new("category_id", "MATKL", KeyNormalizer::Category).truncated(3),
    ColumnMapping::new("brand_id", "BRAND_ID", KeyNormalizer::Brand).defaulting_to("000"),
];

impl EntityDescriptor {
    /// Built-in descriptor for an importable entity type.
    pub fn for_entity(entity_type: EntityType) -> Result<Self> {
        let descriptor = match entity_type {
            EntityType::Article => Self {
                entity_type,
                table_name: "articles".to_string(),
                ledger_table_name: "articles_imported_log".to_string(),
                db_file_name: "articles.db",
                id: ColumnMapping::new("article_id", "MATNR", KeyNormalizer::Article),
                text: ColumnMapping::new("article_name", "MAKTX", KeyNormalizer::Text).optional(),
                extras: ARTICLE_EXTRAS,
            },
            EntityType::Category => Self {
                entity_type,
                table_name: "categories".to_string(),
                ledger_table_name: "categories_imported_log".to_string(),
                db_file_name: "categories.db",
                id: ColumnMapping::new("category_id", "CLASS", KeyNormalizer::Category),
                text: ColumnMapping::new("category_name", "KSCHG", KeyNormalizer::Text),
                extras: &[],
            },
            EntityType::Brand => Self {
                entity_type,
                table_name: "brands".to_string(),
                ledger_table_name: "brands_imported_log".to_string(),
                db_file_name: "brands.db",
                id: ColumnMapping::new("brand_id", "BRAND_ID", KeyNormalizer::Brand)
                    .defaulting_to("000"),
                text: ColumnMapping::new("brand_name", "BRAND_DESCR", KeyNormalizer::Text)
                    .defaulting_to("000"),
                extras: &[],
            },
            EntityType::CostCenter => Self {
                entity_type,
                table_name: "costcenters".to_string(),
                ledger_table_name: "costcenters_imported_log".to_string(),
                db_file_name: "costcenters.db",
                id: ColumnMapping::new("costcenter_id", "KOSTL", KeyNormalizer::CostCenter),
                text: ColumnMapping::new("costcenter_name", "LTXT", KeyNormalizer::Text),
                extras: &[],
            },
            EntityType::Company | EntityType::BusinessArea => {
                bail!("no import descriptor for entity type {entity_type:?}")
            }
        };

        Ok(descriptor)
    }

    pub fn with_table_names(
        mut self,
        table_name: Option<String>,
        ledger_table_name: Option<String>,
    ) -> Result<Self> {
        if let Some(table_name) = table_name {
            self.table_name = table_name;
        }
        if let Some(ledger_table_name) = ledger_table_name {
            self.ledger_table_name = ledger_table_name;
        }
        validate_identifier(&self.table_name)?;
        validate_identifier(&self.ledger_table_name)?;
        Ok(self)
    }

    /// Columns compared for change detection, in insert order after the id.
    pub fn tracked_columns(&self) -> Vec<&'static str> {
        std::iter::once(self.text.column)
            .chain(self.extras.iter().map(|extra| extra.column))
            .collect()
    }

    /// The (category, brand)-style business key used for match extraction.
    pub fn key_pair(&self) -> Option<(&ColumnMapping, &ColumnMapping)> {
        match self.extras {
            [first, second, ..] => Some((first, second)),
            _ => None,
        }
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;
    if !pattern.is_match(name) {
        bail!("invalid table name: {name:?}");
    }
    Ok(())
}
