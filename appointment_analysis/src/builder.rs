pub use crate::config::*;
use crate::run_reappointment_stats;

/// A builder for assembling appointment records.
///
/// It is the simplest way to drive the analysis from code, without going
/// through a tabular input file.
///
/// ```
/// pub use appointment_analysis::builder::Builder;
/// pub use appointment_analysis::AnalysisRules;
/// # use appointment_analysis::AnalysisErrors;
///
/// let mut builder = Builder::new(&AnalysisRules::DEFAULT_RULES)?;
///
/// builder.add_appointment_simple("Jane Doe", "Director", "Health Dept", Some(2015))?;
/// builder.add_appointment_simple("jane   doe", "DIRECTOR", "Health Dept.", Some(2018))?;
///
/// let stats = builder.run()?;
/// assert!(!stats.flagged[0].reappointed);
/// assert!(stats.flagged[1].reappointed);
/// # Ok::<(), AnalysisErrors>(())
/// ```
pub struct Builder {
    pub(crate) _rules: AnalysisRules,
    pub(crate) _records: Vec<Appointment>,
}

impl Builder {
    pub fn new(rules: &AnalysisRules) -> Result<Builder, AnalysisErrors> {
        Ok(Builder {
            _rules: rules.clone(),
            _records: Vec::new(),
        })
    }

    /// Adds one appointment from plain field values.
    ///
    /// Empty or whitespace-only strings are treated as missing data, the
    /// same way a blank cell in a tabular source would be.
    pub fn add_appointment_simple(
        &mut self,
        name: &str,
        position: &str,
        organization: &str,
        year: Option<i32>,
    ) -> Result<(), AnalysisErrors> {
        fn non_blank(s: &str) -> Option<String> {
            if s.trim().is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        self.add_appointment(&Appointment {
            name: non_blank(name),
            position: non_blank(position),
            organization: non_blank(organization),
            year,
            reported_reappointed: None,
        })
    }

    pub fn add_appointment(&mut self, record: &Appointment) -> Result<(), AnalysisErrors> {
        self._records.push(record.clone());
        Ok(())
    }

    /// Runs the batch analysis over everything added so far.
    pub fn run(&self) -> Result<AnalysisStats, AnalysisErrors> {
        run_reappointment_stats(&self._records, &self._rules)
    }
}
