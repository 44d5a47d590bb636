mod config;
pub mod builder;
pub mod manual;
pub mod regression;

use log::{debug, info, warn};

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

pub use crate::config::*;
pub use crate::regression::fit_reappointment_trend;

// **** Private structures ****

/// Separator used inside identity keys. The normalizer drops control
/// characters, so no normalized field can ever contain it.
const KEY_SEPARATOR: char = '\u{1f}';

/// Punctuation stripped by the normalizer.
const STRIPPED_PUNCTUATION: [char; 6] = ['.', ',', ';', ':', '!', '?'];

/// Leading tokens removed by the optional honorific folding.
const HONORIFICS: [&str; 6] = ["mr", "mrs", "ms", "dr", "hon", "prof"];

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
struct OrgId(u32);

// **** Field normalization ****

/// Canonicalizes a free-text field for equality comparison.
///
/// Missing data (None, empty, whitespace-only, or a literal nan/null/n-a
/// left behind by a tabular export) maps to the empty string. Everything
/// else is trimmed, lowercased, whitespace-collapsed and stripped of
/// `.,;:!?` and control characters. No stemming, no phonetic folding.
///
/// Punctuation is dropped before a pending space is committed, so
/// `"Health . Dept"` and `"Health Dept."` both come out as `"health dept"`.
pub fn normalize_field(raw: Option<&str>) -> String {
    let s = match raw {
        Some(s) => s,
        None => return String::new(),
    };
    let trimmed = s.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("n/a")
    {
        return String::new();
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut pending_space = false;
    for c in trimmed.to_lowercase().chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if STRIPPED_PUNCTUATION.contains(&c) || c.is_control() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}

/// Strips one leading honorific token from an already-normalized name.
///
/// `"dr jane doe"` becomes `"jane doe"`. Only applied when
/// [AnalysisRules::fold_honorifics] is set; folding trades matching
/// precision for recall and must never happen silently.
pub fn fold_honorifics(name: &str) -> &str {
    if let Some((first, rest)) = name.split_once(' ') {
        if HONORIFICS.contains(&first) && !rest.is_empty() {
            return rest;
        }
    }
    name
}

// **** Identity keys ****

/// Builds the composite identity key from three normalized fields.
///
/// Returns None when any field is empty: a record with a hole in its
/// identity is undecidable and must never match anything, nor anchor a
/// group as the first occurrence.
pub fn identity_key(name: &str, position: &str, organization: &str) -> Option<String> {
    if name.is_empty() || position.is_empty() || organization.is_empty() {
        return None;
    }
    let mut key = String::with_capacity(name.len() + position.len() + organization.len() + 2);
    key.push_str(name);
    key.push(KEY_SEPARATOR);
    key.push_str(position);
    key.push(KEY_SEPARATOR);
    key.push_str(organization);
    Some(key)
}

fn record_key(record: &Appointment, rules: &AnalysisRules) -> Option<String> {
    let name_n = normalize_field(record.name.as_deref());
    let name_n = if rules.fold_honorifics {
        fold_honorifics(&name_n)
    } else {
        name_n.as_str()
    };
    let position_n = normalize_field(record.position.as_deref());
    let org_n = normalize_field(record.organization.as_deref());
    identity_key(name_n, &position_n, &org_n)
}

// **** Reappointment marking ****

/// Decides the reappointment flag for every record.
///
/// A pure batch transform: records are grouped by identity key, each group
/// is ordered chronologically, and everything after the earliest member is
/// a reappointment. Records with an incomplete identity are left out of
/// grouping and flagged false unconditionally. Any flag present in the
/// input is discarded, but kept on the output for auditing.
///
/// Ordering inside a group is total up to ties: missing years sort after
/// all known years, and ties keep the original input order (stable sort),
/// so the marking is reproducible for a given input order.
pub fn mark_reappointments(
    records: &[Appointment],
    rules: &AnalysisRules,
) -> Result<Vec<FlaggedAppointment>, AnalysisErrors> {
    let mut flagged: Vec<FlaggedAppointment> = records
        .iter()
        .map(|r| FlaggedAppointment {
            name: r.name.clone(),
            position: r.position.clone(),
            organization: r.organization.clone(),
            year: r.year,
            reappointed: false,
            reported_reappointed: r.reported_reappointed,
        })
        .collect();

    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        if let Some(key) = record_key(record, rules) {
            groups.entry(key).or_default().push(idx);
        }
    }
    debug!(
        "mark_reappointments: {} identity groups over {} records",
        groups.len(),
        records.len()
    );

    let mut repeats: usize = 0;
    for members in groups.values_mut() {
        if members.len() < 2 {
            continue;
        }
        // Members are in input order; the sort is stable, so equal and
        // missing years keep that order.
        members.sort_by_key(|&idx| records[idx].year.map_or(i64::MAX, i64::from));
        for &idx in &members[1..] {
            flagged[idx].reappointed = true;
            repeats += 1;
        }
    }
    info!(
        "mark_reappointments: {} of {} records marked as reappointments",
        repeats,
        records.len()
    );

    // Every input row must come out exactly once with a decided flag.
    if flagged.len() != records.len() {
        return Err(AnalysisErrors::RecordCountMismatch {
            expected: records.len(),
            actual: flagged.len(),
        });
    }
    Ok(flagged)
}

// **** Aggregation ****

/// Aggregates flagged records into one cell per (organization, year).
///
/// Cells aggregate on the normalized organization so spelling variants of
/// one organization land in the same cell across years. Records without an
/// organization or without a year inside the configured range are excluded
/// entirely; no sentinel bucket is fabricated for them. Rates are always
/// recomputed from the raw counts of the cell.
pub fn aggregate_org_years(
    flagged: &[FlaggedAppointment],
    rules: &AnalysisRules,
) -> Result<Vec<OrgYearCell>, AnalysisErrors> {
    let (lo, hi) = rules.year_range;

    let mut org_ids: HashMap<String, OrgId> = HashMap::new();
    // Indexed by OrgId: the normalized key and the smallest raw spelling
    // observed, which serves as the display name.
    let mut org_keys: Vec<String> = Vec::new();
    let mut org_display: Vec<String> = Vec::new();
    let mut counts: HashMap<(OrgId, i32), (u64, u64)> = HashMap::new();

    for record in flagged {
        let org_n = normalize_field(record.organization.as_deref());
        if org_n.is_empty() {
            continue;
        }
        let year = match record.year {
            Some(y) if (lo..=hi).contains(&y) => y,
            _ => continue,
        };
        let raw = record
            .organization
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let oid = *org_ids.entry(org_n.clone()).or_insert_with(|| {
            let id = OrgId(org_keys.len() as u32);
            org_keys.push(org_n.clone());
            org_display.push(raw.clone());
            id
        });
        let display = &mut org_display[oid.0 as usize];
        if raw < *display {
            *display = raw;
        }

        let cell = counts.entry((oid, year)).or_insert((0, 0));
        cell.0 += 1;
        if record.reappointed {
            cell.1 += 1;
        }
    }

    let mut cells: Vec<OrgYearCell> = Vec::with_capacity(counts.len());
    for ((oid, year), (appointments, reappointments)) in counts {
        let rate = reappointments as f64 / appointments as f64;
        if !(0.0..=1.0).contains(&rate) {
            return Err(AnalysisErrors::RateOutOfRange {
                organization: org_keys[oid.0 as usize].clone(),
                year,
            });
        }
        cells.push(OrgYearCell {
            organization: org_display[oid.0 as usize].clone(),
            org_key: org_keys[oid.0 as usize].clone(),
            year,
            appointment_count: appointments,
            reappointment_count: reappointments,
            reappointment_rate: rate,
        });
    }
    cells.sort_by(|a, b| a.org_key.cmp(&b.org_key).then(a.year.cmp(&b.year)));
    debug!(
        "aggregate_org_years: {} cells across {} organizations",
        cells.len(),
        org_keys.len()
    );
    Ok(cells)
}

/// Rolls the org-year cells up into one summary per year of the configured
/// range. Years with no cell still appear, with zero counts and an
/// undefined proportion, so the yearly series has no silent holes.
pub fn summarize_years(cells: &[OrgYearCell], rules: &AnalysisRules) -> Vec<AnnualSummary> {
    let (lo, hi) = rules.year_range;
    let mut totals: BTreeMap<i32, (u64, u64)> = (lo..=hi).map(|y| (y, (0, 0))).collect();
    for cell in cells {
        let t = totals.entry(cell.year).or_insert((0, 0));
        t.0 += cell.appointment_count;
        t.1 += cell.reappointment_count;
    }
    totals
        .into_iter()
        .map(|(year, (total, reappointments))| AnnualSummary {
            year,
            total_appointments: total,
            total_reappointments: reappointments,
            reappointment_proportion: if total > 0 {
                Some(reappointments as f64 / total as f64)
            } else {
                None
            },
        })
        .collect()
}

// **** Yearly leader selection ****

/// Comparison used to pick the yearly leader. "Greater" means preferred:
/// highest rate first, then the documented tie-breaks in order (larger
/// sample, more reappointments, lexicographically smallest organization
/// key). The chain ends on the unique organization key, so the winner is
/// independent of input order.
fn leader_order(a: &OrgYearCell, b: &OrgYearCell) -> Ordering {
    a.reappointment_rate
        .partial_cmp(&b.reappointment_rate)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.appointment_count.cmp(&b.appointment_count))
        .then_with(|| a.reappointment_count.cmp(&b.reappointment_count))
        .then_with(|| b.org_key.cmp(&a.org_key))
}

/// Selects, for every year, the organization with the highest
/// reappointment rate among cells with at least
/// [AnalysisRules::min_org_appointments] appointments. Years with no
/// qualifying cell are omitted rather than given an undefined winner.
pub fn select_yearly_leaders(cells: &[OrgYearCell], rules: &AnalysisRules) -> Vec<YearlyLeader> {
    let mut by_year: BTreeMap<i32, Vec<&OrgYearCell>> = BTreeMap::new();
    for cell in cells {
        if cell.appointment_count >= rules.min_org_appointments {
            by_year.entry(cell.year).or_default().push(cell);
        }
    }

    let mut leaders: Vec<YearlyLeader> = Vec::with_capacity(by_year.len());
    for (year, candidates) in by_year {
        let winner = match candidates.into_iter().max_by(|a, b| leader_order(a, b)) {
            Some(w) => w,
            None => continue,
        };
        debug!(
            "select_yearly_leaders: {} -> {} at {:.4} ({}/{})",
            year,
            winner.organization,
            winner.reappointment_rate,
            winner.reappointment_count,
            winner.appointment_count
        );
        leaders.push(YearlyLeader {
            year,
            organization: winner.organization.clone(),
            reappointment_rate: winner.reappointment_rate,
            appointment_count: winner.appointment_count,
            reappointment_count: winner.reappointment_count,
        });
    }
    leaders
}

// **** Orchestration ****

/// Runs the full batch analysis: marking, aggregation, summaries and the
/// yearly leaders. The trend regression is a separate call
/// ([fit_reappointment_trend]) so that a short yearly series fails that
/// stage alone without invalidating the tables produced here.
pub fn run_reappointment_stats(
    records: &[Appointment],
    rules: &AnalysisRules,
) -> Result<AnalysisStats, AnalysisErrors> {
    info!(
        "run_reappointment_stats: processing {} records, rules: {:?}",
        records.len(),
        rules
    );
    if records.is_empty() {
        return Err(AnalysisErrors::EmptyDataset);
    }

    let flagged = mark_reappointments(records, rules)?;

    let (lo, hi) = rules.year_range;
    let mut data_quality = DataQuality::default();
    for record in records {
        if record_key(record, rules).is_none() {
            data_quality.ungroupable += 1;
        }
        if normalize_field(record.organization.as_deref()).is_empty() {
            data_quality.missing_organization += 1;
        } else {
            match record.year {
                None => data_quality.missing_year += 1,
                Some(y) if !(lo..=hi).contains(&y) => data_quality.out_of_range_year += 1,
                Some(_) => {}
            }
        }
    }
    if data_quality != DataQuality::default() {
        warn!(
            "run_reappointment_stats: data-quality gaps: {:?}",
            data_quality
        );
    }

    let org_year_cells = aggregate_org_years(&flagged, rules)?;
    let annual_summaries = summarize_years(&org_year_cells, rules);
    let yearly_leaders = select_yearly_leaders(&org_year_cells, rules);

    info!(
        "run_reappointment_stats: {} cells, {} yearly summaries, {} leaders",
        org_year_cells.len(),
        annual_summaries.len(),
        yearly_leaders.len()
    );

    Ok(AnalysisStats {
        flagged,
        org_year_cells,
        annual_summaries,
        yearly_leaders,
        data_quality,
    })
}
