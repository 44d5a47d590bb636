// Primitives shared by the file readers.

use std::path::Path;

use log::warn;
use snafu::prelude::*;

use crate::pipeline::config_reader::{ColumnMap, FileSource};
use crate::pipeline::{MissingColumnSnafu, ParsedRow, PipelineResult};

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Case-insensitive lookup of a configured column in a header row.
pub fn resolve_column(header: &[String], column: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(column.trim()))
}

/// Resolved positions of the mapped columns in one source file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnLayout {
    pub name: usize,
    pub position: usize,
    pub organization: usize,
    pub year: Option<usize>,
    pub reappointed: Option<usize>,
}

impl ColumnLayout {
    /// Resolves the configured column names against a header row.
    ///
    /// A required column that cannot be found is a schema error raised
    /// before any row is read; the run never proceeds on a partial schema.
    /// The year column is only required when the source has no
    /// `yearOverride`, and the reported flag column is always optional.
    pub fn resolve(
        header: &[String],
        source: &FileSource,
        columns: &ColumnMap,
        path: &str,
    ) -> PipelineResult<ColumnLayout> {
        let name = resolve_column(header, columns.name_column()).context(MissingColumnSnafu {
            column: columns.name_column(),
            path,
        })?;
        let position =
            resolve_column(header, columns.position_column()).context(MissingColumnSnafu {
                column: columns.position_column(),
                path,
            })?;
        let organization =
            resolve_column(header, columns.organization_column()).context(MissingColumnSnafu {
                column: columns.organization_column(),
                path,
            })?;
        let year = match resolve_column(header, columns.year_column()) {
            Some(idx) => Some(idx),
            None if source.year_override.is_some() => None,
            None => {
                return MissingColumnSnafu {
                    column: columns.year_column(),
                    path,
                }
                .fail()
            }
        };
        let reappointed = resolve_column(header, columns.reappointed_column());
        Ok(ColumnLayout {
            name,
            position,
            organization,
            year,
            reappointed,
        })
    }

    /// Assembles one raw row through an accessor from column index to cell
    /// text, so CSV lines and worksheet rows share the same path.
    pub fn parse_row(&self, get: impl Fn(usize) -> Option<String>) -> ParsedRow {
        ParsedRow {
            name: get(self.name),
            position: get(self.position),
            organization: get(self.organization),
            year: self.year.and_then(&get),
            reported_reappointed: self.reappointed.and_then(&get),
        }
    }
}

/// Years arrive as "2015", "2015.0" or with stray whitespace.
pub fn parse_year(raw: &str) -> Option<i32> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(y) = t.parse::<i32>() {
        return Some(y);
    }
    match t.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < 1.0e9 => Some(f as i32),
        _ => None,
    }
}

/// Reported reappointment flags come in many spellings across source
/// years. Anything unrecognized is treated as missing, with a warning.
pub fn parse_reported_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        other => {
            warn!("parse_reported_flag: unrecognized flag value {:?}", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_parsing_accepts_spreadsheet_notations() {
        assert_eq!(parse_year("2015"), Some(2015));
        assert_eq!(parse_year(" 2015 "), Some(2015));
        assert_eq!(parse_year("2015.0"), Some(2015));
        assert_eq!(parse_year(""), None);
        assert_eq!(parse_year("twenty-fifteen"), None);
        assert_eq!(parse_year("2015.5"), None);
    }

    #[test]
    fn flag_parsing_accepts_common_spellings() {
        assert_eq!(parse_reported_flag("True"), Some(true));
        assert_eq!(parse_reported_flag("1"), Some(true));
        assert_eq!(parse_reported_flag("no"), Some(false));
        assert_eq!(parse_reported_flag("0"), Some(false));
        assert_eq!(parse_reported_flag(""), None);
        assert_eq!(parse_reported_flag("maybe"), None);
    }

    #[test]
    fn column_resolution_is_case_insensitive() {
        let header: Vec<String> = ["Name", " POSITION ", "Org", "Year"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(resolve_column(&header, "name"), Some(0));
        assert_eq!(resolve_column(&header, "position"), Some(1));
        assert_eq!(resolve_column(&header, "org"), Some(2));
        assert_eq!(resolve_column(&header, "salary"), None);
    }
}
