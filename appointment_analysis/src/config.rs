// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// One appointment record, after column mapping but before any analysis.
///
/// All identity fields are optional: public appointment registers routinely
/// ship rows with a missing name, position or organization. Such rows are
/// kept in the totals but can never take part in reappointment matching.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Appointment {
    pub name: Option<String>,
    pub position: Option<String>,
    pub organization: Option<String>,
    pub year: Option<i32>,
    /// The reappointment flag as it appeared in the source, if any.
    /// It is known to be unreliable and is never used for matching.
    pub reported_reappointed: Option<bool>,
}

// ******** Output data structures *********

/// An appointment record with the recomputed reappointment flag.
///
/// Both the recomputed flag and the flag reported by the source are kept so
/// that downstream reporting can audit the disagreement between the two.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FlaggedAppointment {
    pub name: Option<String>,
    pub position: Option<String>,
    pub organization: Option<String>,
    pub year: Option<i32>,
    pub reappointed: bool,
    pub reported_reappointed: Option<bool>,
}

/// Aggregate for one (organization, year) pair.
#[derive(PartialEq, Debug, Clone)]
pub struct OrgYearCell {
    /// Canonical display spelling: the lexicographically smallest raw
    /// spelling observed for this organization key.
    pub organization: String,
    /// The normalized organization string the cell aggregates on.
    pub org_key: String,
    pub year: i32,
    pub appointment_count: u64,
    pub reappointment_count: u64,
    /// Always reappointment_count / appointment_count; a cell only exists
    /// when appointment_count >= 1.
    pub reappointment_rate: f64,
}

/// Government-wide aggregate for one year of the configured range.
#[derive(PartialEq, Debug, Clone)]
pub struct AnnualSummary {
    pub year: i32,
    pub total_appointments: u64,
    pub total_reappointments: u64,
    /// None for a year with zero appointments.
    pub reappointment_proportion: Option<f64>,
}

/// The organization with the highest reappointment rate for one year.
#[derive(PartialEq, Debug, Clone)]
pub struct YearlyLeader {
    pub year: i32,
    pub organization: String,
    pub reappointment_rate: f64,
    pub appointment_count: u64,
    pub reappointment_count: u64,
}

/// Counts of rows set aside by the data-quality rules.
///
/// These are never errors: a row with a hole in it is excluded from the
/// affected computation, counted here, and reported by the caller.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct DataQuality {
    /// Rows with an empty normalized name, position or organization.
    /// Excluded from grouping, always flagged as non-reappointments.
    pub ungroupable: usize,
    /// Rows without an organization, excluded from the org-year table.
    pub missing_organization: usize,
    /// Rows without a year, excluded from the org-year table and the
    /// annual summaries.
    pub missing_year: usize,
    /// Rows whose year falls outside the configured range, excluded from
    /// aggregation so a misparsed year cannot distort the trend.
    pub out_of_range_year: usize,
}

/// Everything the batch pipeline produces short of the trend regression.
#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisStats {
    pub flagged: Vec<FlaggedAppointment>,
    pub org_year_cells: Vec<OrgYearCell>,
    pub annual_summaries: Vec<AnnualSummary>,
    pub yearly_leaders: Vec<YearlyLeader>,
    pub data_quality: DataQuality,
}

/// Direction of the fitted trend, from the sign of the slope alone.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
}

impl Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Flat => write!(f, "flat"),
        }
    }
}

/// Residual autocorrelation verdict from the Durbin-Watson statistic.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Autocorrelation {
    /// DW below 1.5.
    Positive,
    /// DW above 2.5.
    Negative,
    /// Neither cutoff reached.
    None,
}

impl Display for Autocorrelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Autocorrelation::Positive => write!(f, "positive"),
            Autocorrelation::Negative => write!(f, "negative"),
            Autocorrelation::None => write!(f, "none"),
        }
    }
}

/// Result of the ordinary least-squares fit of the yearly reappointment
/// proportion against the year, with the standard diagnostics.
#[derive(PartialEq, Debug, Clone)]
pub struct RegressionResult {
    pub slope: f64,
    pub intercept: f64,
    pub correlation: f64,
    pub r_squared: f64,
    /// Two-sided p-value for the null hypothesis slope = 0.
    pub p_value: f64,
    /// Standard error of the slope.
    pub std_err: f64,
    /// 95% confidence interval for the slope.
    pub confidence_interval: (f64, f64),
    pub durbin_watson: f64,
    pub autocorrelation: Autocorrelation,
    /// Jarque-Bera p-value for residual normality.
    pub normality_p_value: f64,
    /// Years whose standardized residual exceeds 2.5 in absolute value.
    pub outlier_years: Vec<i32>,
    pub trend_direction: TrendDirection,
    /// True iff p_value < 0.05.
    pub is_significant: bool,
}

/// Errors that prevent the analysis from completing successfully.
///
/// Data-quality gaps are not errors; they are handled row by row and
/// reported through [DataQuality].
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AnalysisErrors {
    /// No records were supplied at all.
    EmptyDataset,
    /// The marker produced a different number of rows than it was given.
    /// This is a logic defect, not a data defect.
    RecordCountMismatch { expected: usize, actual: usize },
    /// An aggregated rate left [0, 1]. Also a logic defect.
    RateOutOfRange { organization: String, year: i32 },
    /// Fewer than 3 usable (year, proportion) points for the regression.
    InsufficientHistory { points: usize },
    /// All usable points share the same year; the slope is undefined.
    DegenerateSeries,
}

impl Error for AnalysisErrors {}

impl Display for AnalysisErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisErrors::EmptyDataset => write!(f, "no appointment records supplied"),
            AnalysisErrors::RecordCountMismatch { expected, actual } => write!(
                f,
                "internal consistency violation: {} records in, {} records out",
                expected, actual
            ),
            AnalysisErrors::RateOutOfRange { organization, year } => write!(
                f,
                "internal consistency violation: rate outside [0, 1] for {} in {}",
                organization, year
            ),
            AnalysisErrors::InsufficientHistory { points } => write!(
                f,
                "regression needs at least 3 yearly data points, got {}",
                points
            ),
            AnalysisErrors::DegenerateSeries => {
                write!(f, "all regression points share the same year")
            }
        }
    }
}

// ********* Configuration **********

/// The rules that govern one analysis run.
///
/// Everything here is a documented policy choice; there is no hidden
/// variant behavior. In particular honorific folding changes matching
/// recall and must be asked for explicitly.
#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisRules {
    /// Strip a leading honorific (mr, mrs, ms, dr, hon, prof) from the
    /// normalized name before building the identity key.
    pub fold_honorifics: bool,
    /// Inclusive year range the annual summaries cover. Rows with a year
    /// outside this range are excluded from aggregation as a data-quality
    /// gap.
    pub year_range: (i32, i32),
    /// Minimum appointment count for a cell to be eligible in the yearly
    /// leader selection. 1 means no threshold.
    pub min_org_appointments: u64,
}

impl AnalysisRules {
    pub const DEFAULT_RULES: AnalysisRules = AnalysisRules {
        fold_honorifics: false,
        year_range: (2013, 2024),
        min_org_appointments: 1,
    };
}
