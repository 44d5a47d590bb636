use crate::pipeline::*;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "analysisName")]
    pub analysis_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "yearRangeStart")]
    pub year_range_start: Option<i32>,
    #[serde(rename = "yearRangeEnd")]
    pub year_range_end: Option<i32>,
}

/// Header names of the mapped columns. Every field has a default, so a
/// source that already uses the conventional names needs no mapping at all.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMap {
    pub name: Option<String>,
    pub position: Option<String>,
    pub organization: Option<String>,
    pub year: Option<String>,
    pub reappointed: Option<String>,
}

impl ColumnMap {
    pub fn name_column(&self) -> &str {
        self.name.as_deref().unwrap_or("name")
    }
    pub fn position_column(&self) -> &str {
        self.position.as_deref().unwrap_or("position")
    }
    pub fn organization_column(&self) -> &str {
        self.organization.as_deref().unwrap_or("org")
    }
    pub fn year_column(&self) -> &str {
        self.year.as_deref().unwrap_or("year")
    }
    pub fn reappointed_column(&self) -> &str {
        self.reappointed.as_deref().unwrap_or("reappointed")
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// Declares the whole file to be one year's register. Wins over any
    /// year column, and makes that column optional.
    #[serde(rename = "yearOverride")]
    pub year_override: Option<i32>,
    #[serde(rename = "worksheetName")]
    pub worksheet_name: Option<String>,
    /// Per-file override of the top-level column map.
    pub columns: Option<ColumnMap>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RuleSettings {
    #[serde(rename = "foldHonorifics")]
    pub fold_honorifics: Option<bool>,
    #[serde(rename = "minOrganizationCount")]
    pub min_organization_count: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "sourceFiles")]
    pub source_files: Vec<FileSource>,
    pub columns: Option<ColumnMap>,
    pub rules: Option<RuleSettings>,
}

/// Echo of the effective settings, included in the summary output so a
/// saved summary is self-describing.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub analysis: String,
    #[serde(rename = "yearRange")]
    pub year_range: (i32, i32),
    #[serde(rename = "minOrganizationCount")]
    pub min_organization_count: u64,
    #[serde(rename = "foldHonorifics")]
    pub fold_honorifics: bool,
}

pub fn read_config(path: String) -> PipelineResult<TrendConfig> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})
}

pub fn read_summary(path: String) -> PipelineResult<JSValue> {
    let contents = fs::read_to_string(path.clone()).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// Translates the loose JSON settings into the core's typed rules,
/// applying defaults and the command-line override for the minimum count.
pub fn validate_rules(
    config: &TrendConfig,
    min_count_override: Option<u64>,
) -> PipelineResult<AnalysisRules> {
    let defaults = AnalysisRules::DEFAULT_RULES;
    let lo = config
        .output_settings
        .year_range_start
        .unwrap_or(defaults.year_range.0);
    let hi = config
        .output_settings
        .year_range_end
        .unwrap_or(defaults.year_range.1);
    if lo > hi {
        whatever!("invalid year range {}..{}", lo, hi);
    }

    let settings = config.rules.clone().unwrap_or(RuleSettings {
        fold_honorifics: None,
        min_organization_count: None,
    });
    let min_org_appointments = min_count_override
        .or(settings.min_organization_count)
        .unwrap_or(defaults.min_org_appointments);
    if min_org_appointments == 0 {
        whatever!("minOrganizationCount must be at least 1");
    }

    Ok(AnalysisRules {
        fold_honorifics: settings.fold_honorifics.unwrap_or(defaults.fold_honorifics),
        year_range: (lo, hi),
        min_org_appointments,
    })
}
