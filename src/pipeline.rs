use log::{info, warn};

use appointment_analysis::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::pipeline::config_reader::*;
use crate::pipeline::io_common::simplify_file_name;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;

#[derive(Debug, Snafu)]
pub enum PipelineError {
    #[snafu(display("Error opening workbook {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No readable worksheet in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading a CSV line"))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("Required column '{column}' is missing from {path}"))]
    MissingColumn { column: String, path: String },
    #[snafu(display("Error writing table {path}"))]
    WritingCsv { source: csv::Error, path: String },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{source}"))]
    Analysis { source: AnalysisErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// One row as produced by the file readers, before any parsing of the year
/// or of the reported flag. All values are raw cell text.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ParsedRow {
    pub name: Option<String>,
    pub position: Option<String>,
    pub organization: Option<String>,
    pub year: Option<String>,
    pub reported_reappointed: Option<String>,
}

/// Turns raw rows into appointment records.
///
/// Field-level problems are data-quality gaps, not errors: an unparseable
/// year is logged and treated as missing, and blank cells become missing
/// values. A `yearOverride` on the source wins over any year cell, since
/// the configuration declares the whole file to be one year's register.
fn validate_rows(parsed: &[ParsedRow], source: &FileSource) -> PipelineResult<Vec<Appointment>> {
    fn non_blank(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    let mut res: Vec<Appointment> = Vec::with_capacity(parsed.len());
    for (idx, row) in parsed.iter().enumerate() {
        let year = match source.year_override {
            Some(y) => Some(y),
            None => match non_blank(&row.year) {
                Some(raw) => {
                    let parsed_year = io_common::parse_year(&raw);
                    if parsed_year.is_none() {
                        warn!(
                            "validate_rows: row {} of {}: cannot read year {:?}, treating as missing",
                            idx + 1,
                            source.file_path,
                            raw
                        );
                    }
                    parsed_year
                }
                None => None,
            },
        };
        let reported_reappointed = non_blank(&row.reported_reappointed)
            .as_deref()
            .and_then(io_common::parse_reported_flag);

        res.push(Appointment {
            name: non_blank(&row.name),
            position: non_blank(&row.position),
            organization: non_blank(&row.organization),
            year,
            reported_reappointed,
        });
    }
    Ok(res)
}

fn read_appointment_data(
    root_path: &str,
    source: &FileSource,
    columns: &ColumnMap,
) -> PipelineResult<Vec<Appointment>> {
    let p: PathBuf = [root_path, source.file_path.as_str()].iter().collect();
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read appointment file {:?}", p2);
    let parsed = match source.provider.as_str() {
        "csv" => io_csv::read_appointment_csv(p2, source, columns),
        "excel" => io_excel::read_appointment_excel(p2, source, columns),
        x => whatever!("Provider not implemented {:?}", x),
    }?;
    validate_rows(&parsed, source)
}

fn load_config(args: &Args) -> PipelineResult<(TrendConfig, String)> {
    if let Some(input) = &args.input {
        // Config-less mode: one source file, default columns and rules.
        let provider = args.input_type.clone().unwrap_or_else(|| "csv".to_string());
        let config = TrendConfig {
            output_settings: OutputSettings {
                analysis_name: simplify_file_name(input),
                output_directory: None,
                year_range_start: None,
                year_range_end: None,
            },
            source_files: vec![FileSource {
                provider,
                file_path: input.clone(),
                year_override: None,
                worksheet_name: None,
                columns: None,
            }],
            columns: None,
            rules: None,
        };
        return Ok((config, String::new()));
    }

    let config_path = match &args.config {
        Some(p) => p.clone(),
        None => whatever!("either --config or --input must be provided"),
    };
    let config = read_config(config_path.clone())?;
    let root = Path::new(config_path.as_str())
        .parent()
        .and_then(|p| p.as_os_str().to_str())
        .unwrap_or("")
        .to_string();
    Ok((config, root))
}

pub fn run_analysis(args: &Args) -> PipelineResult<()> {
    let (config, root_path) = load_config(args)?;
    info!("config: {:?}", config);

    let rules = validate_rules(&config, args.min_count)?;

    if config.source_files.is_empty() {
        whatever!("no source files configured");
    }

    let default_columns = config.columns.clone().unwrap_or_default();
    let mut records: Vec<Appointment> = Vec::new();
    for source in &config.source_files {
        let columns = source.columns.clone().unwrap_or_else(|| default_columns.clone());
        let mut file_records = read_appointment_data(&root_path, source, &columns)?;
        info!(
            "run_analysis: {} records from {}",
            file_records.len(),
            source.file_path
        );
        records.append(&mut file_records);
    }

    let stats = run_reappointment_stats(&records, &rules).context(AnalysisSnafu)?;

    let out_dir = args
        .out_dir
        .clone()
        .or_else(|| config.output_settings.output_directory.clone())
        .unwrap_or_else(|| "out".to_string());
    fs::create_dir_all(&out_dir).context(WritingFileSnafu {
        path: out_dir.clone(),
    })?;

    write_flagged(&table_path(&out_dir, "appointments_flagged.csv"), &stats.flagged)?;
    write_cells(&table_path(&out_dir, "org_year_rates.csv"), &stats.org_year_cells)?;
    write_summaries(&table_path(&out_dir, "annual_summary.csv"), &stats.annual_summaries)?;
    write_leaders(&table_path(&out_dir, "yearly_max.csv"), &stats.yearly_leaders)?;

    // The regression runs after the tables are on disk: a yearly series
    // that is too short fails this stage alone without invalidating them.
    let regression = fit_reappointment_trend(&stats.annual_summaries).context(AnalysisSnafu)?;
    info!(
        "run_analysis: trend {} (p = {:.4}, significant: {})",
        regression.trend_direction, regression.p_value, regression.is_significant
    );

    let summary_js = build_summary_js(&config, &rules, &stats, &regression);
    let pretty = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu)?;
    let summary_path = table_path(&out_dir, "trend_summary.json");
    fs::write(&summary_path, &pretty).context(WritingFileSnafu {
        path: summary_path.clone(),
    })?;
    println!("{}", pretty);

    // The reference summary, if provided for comparison
    if let Some(reference_path) = &args.reference {
        check_reference(reference_path.clone(), &pretty)?;
    }

    Ok(())
}

fn check_reference(reference_path: String, computed_pretty: &str) -> PipelineResult<()> {
    let reference = read_summary(reference_path)?;
    let pretty_ref = serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu)?;
    if pretty_ref != computed_pretty {
        warn!("Found differences with the reference summary");
        print_diff(pretty_ref.as_str(), computed_pretty, "\n");
        whatever!("Difference detected between computed summary and reference summary");
    }
    Ok(())
}

fn table_path(out_dir: &str, file_name: &str) -> String {
    let p: PathBuf = [out_dir, file_name].iter().collect();
    p.as_path().display().to_string()
}

fn write_flagged(path: &str, flagged: &[FlaggedAppointment]) -> PipelineResult<()> {
    let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
    wtr.write_record([
        "name",
        "position",
        "organization",
        "year",
        "reappointed",
        "reported_reappointed",
    ])
    .context(WritingCsvSnafu { path })?;
    for f in flagged {
        wtr.write_record([
            f.name.clone().unwrap_or_default(),
            f.position.clone().unwrap_or_default(),
            f.organization.clone().unwrap_or_default(),
            f.year.map(|y| y.to_string()).unwrap_or_default(),
            f.reappointed.to_string(),
            f.reported_reappointed.map(|b| b.to_string()).unwrap_or_default(),
        ])
        .context(WritingCsvSnafu { path })?;
    }
    wtr.flush().context(WritingFileSnafu { path })?;
    Ok(())
}

fn write_cells(path: &str, cells: &[OrgYearCell]) -> PipelineResult<()> {
    let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
    wtr.write_record([
        "organization",
        "year",
        "appointment_count",
        "reappointment_count",
        "reappointment_rate",
    ])
    .context(WritingCsvSnafu { path })?;
    for cell in cells {
        wtr.write_record([
            cell.organization.clone(),
            cell.year.to_string(),
            cell.appointment_count.to_string(),
            cell.reappointment_count.to_string(),
            format!("{}", cell.reappointment_rate),
        ])
        .context(WritingCsvSnafu { path })?;
    }
    wtr.flush().context(WritingFileSnafu { path })?;
    Ok(())
}

fn write_summaries(path: &str, summaries: &[AnnualSummary]) -> PipelineResult<()> {
    let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
    wtr.write_record([
        "year",
        "total_appointments",
        "total_reappointments",
        "reappointment_proportion",
    ])
    .context(WritingCsvSnafu { path })?;
    for s in summaries {
        wtr.write_record([
            s.year.to_string(),
            s.total_appointments.to_string(),
            s.total_reappointments.to_string(),
            s.reappointment_proportion
                .map(|p| format!("{}", p))
                .unwrap_or_default(),
        ])
        .context(WritingCsvSnafu { path })?;
    }
    wtr.flush().context(WritingFileSnafu { path })?;
    Ok(())
}

fn write_leaders(path: &str, leaders: &[YearlyLeader]) -> PipelineResult<()> {
    let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
    wtr.write_record([
        "year",
        "organization",
        "reappointment_rate",
        "appointment_count",
        "reappointment_count",
    ])
    .context(WritingCsvSnafu { path })?;
    for l in leaders {
        wtr.write_record([
            l.year.to_string(),
            l.organization.clone(),
            format!("{}", l.reappointment_rate),
            l.appointment_count.to_string(),
            l.reappointment_count.to_string(),
        ])
        .context(WritingCsvSnafu { path })?;
    }
    wtr.flush().context(WritingFileSnafu { path })?;
    Ok(())
}

fn build_summary_js(
    config: &TrendConfig,
    rules: &AnalysisRules,
    stats: &AnalysisStats,
    regression: &RegressionResult,
) -> JSValue {
    let c = OutputConfig {
        analysis: config.output_settings.analysis_name.clone(),
        year_range: rules.year_range,
        min_organization_count: rules.min_org_appointments,
        fold_honorifics: rules.fold_honorifics,
    };
    let leaders: Vec<JSValue> = stats
        .yearly_leaders
        .iter()
        .map(|l| {
            json!({
                "year": l.year,
                "organization": l.organization,
                "rate": l.reappointment_rate,
                "appointments": l.appointment_count,
                "reappointments": l.reappointment_count,
            })
        })
        .collect();
    json!({
        "config": c,
        "trend": {
            "direction": regression.trend_direction.to_string(),
            "isSignificant": regression.is_significant,
            "slope": regression.slope,
            "intercept": regression.intercept,
            "correlation": regression.correlation,
            "rSquared": regression.r_squared,
            "pValue": regression.p_value,
            "stdErr": regression.std_err,
            "confidenceInterval": [regression.confidence_interval.0, regression.confidence_interval.1],
            "durbinWatson": regression.durbin_watson,
            "autocorrelation": regression.autocorrelation.to_string(),
            "normalityPValue": regression.normality_p_value,
            "outlierYears": regression.outlier_years,
        },
        "yearlyLeaders": leaders,
        "dataQuality": {
            "ungroupable": stats.data_quality.ungroupable,
            "missingOrganization": stats.data_quality.missing_organization,
            "missingYear": stats.data_quality.missing_year,
            "outOfRangeYear": stats.data_quality.out_of_range_year,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Args;

    fn test_args(input: &str, out_dir: &str) -> Args {
        Args {
            config: None,
            reference: None,
            out_dir: Some(out_dir.to_string()),
            input: Some(input.to_string()),
            input_type: None,
            min_count: None,
            verbose: false,
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("apptrend_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn config_parsing_accepts_camel_case() {
        let raw = r#"{
            "outputSettings": {
                "analysisName": "test run",
                "outputDirectory": "out",
                "yearRangeStart": 2013,
                "yearRangeEnd": 2020
            },
            "sourceFiles": [
                { "provider": "csv", "filePath": "a.csv", "yearOverride": 2013 }
            ],
            "columns": { "organization": "org_name" },
            "rules": { "foldHonorifics": true, "minOrganizationCount": 5 }
        }"#;
        let config: TrendConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.output_settings.analysis_name, "test run");
        assert_eq!(config.source_files[0].year_override, Some(2013));
        assert_eq!(
            config.columns.as_ref().unwrap().organization_column(),
            "org_name"
        );

        let rules = validate_rules(&config, None).unwrap();
        assert!(rules.fold_honorifics);
        assert_eq!(rules.year_range, (2013, 2020));
        assert_eq!(rules.min_org_appointments, 5);

        // The command line takes precedence over the file.
        let rules = validate_rules(&config, Some(2)).unwrap();
        assert_eq!(rules.min_org_appointments, 2);
    }

    #[test]
    fn rules_validation_rejects_nonsense() {
        let raw = r#"{
            "outputSettings": { "analysisName": "x", "yearRangeStart": 2020, "yearRangeEnd": 2013 },
            "sourceFiles": []
        }"#;
        let config: TrendConfig = serde_json::from_str(raw).unwrap();
        assert!(validate_rules(&config, None).is_err());
    }

    #[test]
    fn year_override_wins_over_missing_year_column() {
        let dir = scratch_dir("override");
        let path = dir.join("one_year.csv");
        fs::write(&path, "name,position,org\nJane Doe,Director,Health Dept\n").unwrap();

        let source = FileSource {
            provider: "csv".to_string(),
            file_path: path.display().to_string(),
            year_override: Some(2015),
            worksheet_name: None,
            columns: None,
        };
        let records = read_appointment_data("", &source, &ColumnMap::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].year, Some(2015));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_required_column_is_a_schema_error() {
        let dir = scratch_dir("schema");
        let path = dir.join("bad.csv");
        fs::write(&path, "name,org,year\nJane Doe,Health Dept,2015\n").unwrap();

        let args = test_args(
            path.to_str().unwrap(),
            dir.join("out").to_str().unwrap(),
        );
        let err = run_analysis(&args).unwrap_err();
        match err {
            PipelineError::MissingColumn { column, .. } => assert_eq!(column, "position"),
            other => panic!("expected a schema error, got {:?}", other),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn end_to_end_run_writes_all_tables() {
        let dir = scratch_dir("endtoend");
        let path = dir.join("appointments.csv");
        // The 2015 Jane Doe row is a reappointment of the 2013 one despite
        // the spelling differences; the reported flag on row 2 is wrong on
        // purpose and must be overwritten.
        fs::write(
            &path,
            "name,position,org,year,reappointed\n\
             Jane Doe,Director,Health Dept,2013,false\n\
             John Roe,Chair,Arts Board,2014,true\n\
             jane   doe,DIRECTOR,Health Dept.,2015,\n\
             Mary Major,Clerk,Arts Board,2015,\n",
        )
        .unwrap();

        let out_dir = dir.join("out");
        let args = test_args(path.to_str().unwrap(), out_dir.to_str().unwrap());
        run_analysis(&args).unwrap();

        for table in [
            "appointments_flagged.csv",
            "org_year_rates.csv",
            "annual_summary.csv",
            "yearly_max.csv",
            "trend_summary.json",
        ] {
            assert!(out_dir.join(table).exists(), "{} missing", table);
        }

        let flagged = fs::read_to_string(out_dir.join("appointments_flagged.csv")).unwrap();
        let lines: Vec<&str> = flagged.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[3].contains("true"));
        assert!(lines[2].starts_with("John Roe"));
        assert!(lines[2].contains("false,true"));

        let summary: JSValue =
            serde_json::from_str(&fs::read_to_string(out_dir.join("trend_summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["trend"]["direction"], "increasing");
        assert_eq!(summary["dataQuality"]["ungroupable"], 0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reference_mismatch_fails_the_run() {
        let dir = scratch_dir("reference");
        let path = dir.join("appointments.csv");
        fs::write(
            &path,
            "name,position,org,year\n\
             Jane Doe,Director,Health Dept,2013\n\
             John Roe,Chair,Arts Board,2014\n\
             Mary Major,Clerk,Arts Board,2015\n",
        )
        .unwrap();
        let reference_path = dir.join("expected.json");
        fs::write(&reference_path, "{\"not\": \"the same\"}").unwrap();

        let mut args = test_args(
            path.to_str().unwrap(),
            dir.join("out").to_str().unwrap(),
        );
        args.reference = Some(reference_path.display().to_string());
        assert!(run_analysis(&args).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
