//! Column Schema
//!
//! Metric families, their tag→column tables and the column layout handed to
//! the host. Positions 0 and 1 are always `time` and `model`; metric columns
//! follow in table order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position of the measurement time column
pub const TIME_COLUMN: usize = 0;
/// Position of the device model column
pub const MODEL_COLUMN: usize = 1;
/// Position of the first metric column
pub const FIRST_METRIC_COLUMN: usize = 2;

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Timestamp,
    String,
    Long,
    Double,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Timestamp => "timestamp",
            ColumnType::String => "string",
            ColumnType::Long => "long",
            ColumnType::Double => "double",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared output column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub index: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(index: usize, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            index,
            name: name.into(),
            column_type,
        }
    }
}

/// Static mapping of one API tag code to a metric column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagColumn {
    /// Tag code as sent by the service
    pub tag: &'static str,
    /// Stable key used to look up display names
    pub key: &'static str,
    pub column_type: ColumnType,
}

const fn tag(tag: &'static str, key: &'static str, column_type: ColumnType) -> TagColumn {
    TagColumn {
        tag,
        key,
        column_type,
    }
}

static INNERSCAN_TAGS: &[TagColumn] = &[
    tag("6021", "weight", ColumnType::Double),
    tag("6022", "body_fat", ColumnType::Double),
    tag("6023", "muscle_mass", ColumnType::Double),
    tag("6024", "muscle_score", ColumnType::Long),
    tag("6025", "visceral_fat_level2", ColumnType::Double),
    tag("6026", "visceral_fat_level1", ColumnType::Long),
    tag("6027", "basal_metabolic_rate", ColumnType::Long),
    tag("6028", "metabolic_age", ColumnType::Long),
    tag("6029", "estimated_bone_mass", ColumnType::Double),
];

static SPHYGMOMANOMETER_TAGS: &[TagColumn] = &[
    tag("622E", "sbp", ColumnType::Long),
    tag("622F", "dbp", ColumnType::Long),
    tag("6230", "pulse", ColumnType::Long),
];

/// Family of measurements served by one query endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    /// Body composition scales
    #[default]
    Innerscan,
    /// Blood pressure monitors
    Sphygmomanometer,
}

impl MetricFamily {
    /// OAuth scope granting access to this family
    pub fn scope(&self) -> &'static str {
        match self {
            MetricFamily::Innerscan => "innerscan",
            MetricFamily::Sphygmomanometer => "sphygmomanometer",
        }
    }

    /// Query endpoint path, relative to the service base URL
    pub fn endpoint(&self) -> &'static str {
        match self {
            MetricFamily::Innerscan => "status/innerscan.json",
            MetricFamily::Sphygmomanometer => "status/sphygmomanometer.json",
        }
    }

    pub fn tags(&self) -> &'static [TagColumn] {
        match self {
            MetricFamily::Innerscan => INNERSCAN_TAGS,
            MetricFamily::Sphygmomanometer => SPHYGMOMANOMETER_TAGS,
        }
    }

    /// Comma-separated tag list for the `tag` query parameter
    pub fn tag_query(&self) -> String {
        self.tags()
            .iter()
            .map(|t| t.tag)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Column position and mapping for a tag, `None` for untracked tags
    pub fn column_for_tag(&self, code: &str) -> Option<(usize, &'static TagColumn)> {
        self.tags()
            .iter()
            .position(|t| t.tag == code)
            .map(|i| (FIRST_METRIC_COLUMN + i, &self.tags()[i]))
    }

    /// Total row width including `time` and `model`
    pub fn width(&self) -> usize {
        FIRST_METRIC_COLUMN + self.tags().len()
    }

    /// Ordered column declaration for this family
    pub fn schema(&self, lang: Language) -> Vec<Column> {
        let mut columns = vec![
            Column::new(TIME_COLUMN, lang.display_name("time"), ColumnType::Timestamp),
            Column::new(MODEL_COLUMN, lang.display_name("model"), ColumnType::String),
        ];
        for (i, t) in self.tags().iter().enumerate() {
            let name = match lang {
                Language::Raw => t.tag.to_string(),
                _ => lang.display_name(t.key),
            };
            columns.push(Column::new(FIRST_METRIC_COLUMN + i, name, t.column_type));
        }
        columns
    }
}

impl FromStr for MetricFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "innerscan" => Ok(MetricFamily::Innerscan),
            "sphygmomanometer" => Ok(MetricFamily::Sphygmomanometer),
            other => Err(format!("unknown metric family: {}", other)),
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scope())
    }
}

/// Display-name language for column headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    Japanese,
    English,
    /// API tag codes as-is
    #[default]
    Raw,
}

impl Language {
    /// Map a free-form selector (`ja`, `japanese`, `en`, `english`, ...)
    pub fn from_selector(selector: &str) -> Self {
        match selector.to_lowercase().as_str() {
            "ja" | "japanese" => Language::Japanese,
            "en" | "english" => Language::English,
            _ => Language::Raw,
        }
    }

    /// Display name for a column key, falling back to the key itself
    pub fn display_name(&self, key: &str) -> String {
        let name = match self {
            Language::Japanese => match key {
                "time" => "測定日時",
                "model" => "モデル",
                "weight" => "体重",
                "body_fat" => "体脂肪率",
                "muscle_mass" => "筋肉量",
                "muscle_score" => "筋肉スコア",
                "visceral_fat_level2" => "内臓脂肪レベル2",
                "visceral_fat_level1" => "内臓脂肪レベル1",
                "basal_metabolic_rate" => "基礎代謝量",
                "metabolic_age" => "体内年齢",
                "estimated_bone_mass" => "推定骨量",
                "sbp" => "最高血圧",
                "dbp" => "最低血圧",
                "pulse" => "脈拍",
                other => other,
            },
            Language::English => match key {
                "time" => "time",
                "model" => "model",
                "weight" => "weight",
                "body_fat" => "body fat %",
                "muscle_mass" => "muscle mass",
                "muscle_score" => "muscle score",
                "visceral_fat_level2" => "visceral fat level 2",
                "visceral_fat_level1" => "visceral fat level 1",
                "basal_metabolic_rate" => "basal metabolic rate",
                "metabolic_age" => "metabolic age",
                "estimated_bone_mass" => "estimated bone mass",
                "sbp" => "Systolic Blood Pressure",
                "dbp" => "Diastolic Blood Pressure",
                "pulse" => "Pulse",
                other => other,
            },
            Language::Raw => key,
        };
        name.to_string()
    }
}
