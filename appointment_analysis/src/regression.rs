//! Ordinary least-squares trend fit for the yearly reappointment series,
//! with the standard diagnostics: slope significance, Durbin-Watson,
//! Jarque-Bera residual normality and standardized-residual outliers.

use log::{debug, info};

use crate::config::{
    AnalysisErrors, AnnualSummary, Autocorrelation, RegressionResult, TrendDirection,
};

/// Fits `proportion = intercept + slope * year` over the years with a
/// defined proportion and qualifies the trend.
///
/// Fewer than 3 usable points is an input error: a two-point regression
/// always fits perfectly and would report a meaningless trend. The caller
/// is expected to treat that error as fatal for this stage only; the
/// upstream tables remain valid.
pub fn fit_reappointment_trend(
    summaries: &[AnnualSummary],
) -> Result<RegressionResult, AnalysisErrors> {
    let mut points: Vec<(i32, f64)> = summaries
        .iter()
        .filter_map(|s| s.reappointment_proportion.map(|p| (s.year, p)))
        .collect();
    points.sort_by_key(|&(year, _)| year);

    if points.len() < 3 {
        return Err(AnalysisErrors::InsufficientHistory {
            points: points.len(),
        });
    }
    let n = points.len() as f64;
    info!("fit_reappointment_trend: fitting {} yearly points", points.len());

    let mean_x = points.iter().map(|&(x, _)| f64::from(x)).sum::<f64>() / n;
    let mean_y = points.iter().map(|&(_, y)| y).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for &(x, y) in &points {
        let dx = f64::from(x) - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx == 0.0 {
        return Err(AnalysisErrors::DegenerateSeries);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let residuals: Vec<f64> = points
        .iter()
        .map(|&(x, y)| y - (intercept + slope * f64::from(x)))
        .collect();
    let ss_res: f64 = residuals.iter().map(|e| e * e).sum();
    let df = n - 2.0;

    let correlation = if syy > 0.0 { sxy / (sxx * syy).sqrt() } else { 0.0 };
    let r_squared = if syy > 0.0 { 1.0 - ss_res / syy } else { 0.0 };

    let sigma2 = ss_res / df;
    let std_err = (sigma2 / sxx).sqrt();
    let p_value = if std_err > 0.0 {
        student_t_p_two_sided((slope / std_err).abs(), df)
    } else if slope == 0.0 {
        1.0
    } else {
        0.0
    };
    let t_crit = student_t_critical(df, 0.05);
    let confidence_interval = (slope - t_crit * std_err, slope + t_crit * std_err);

    // Below the float noise floor the fit is exact and the residuals carry
    // no structure worth testing.
    let noise_floor = f64::EPSILON * syy.max(f64::MIN_POSITIVE);
    let (durbin_watson, normality_p_value, outlier_years) = if ss_res <= noise_floor {
        (2.0, 1.0, Vec::new())
    } else {
        let dw = residuals
            .windows(2)
            .map(|w| (w[1] - w[0]) * (w[1] - w[0]))
            .sum::<f64>()
            / ss_res;
        let jb_p = jarque_bera_p(&residuals);
        let s = sigma2.sqrt();
        let outliers: Vec<i32> = points
            .iter()
            .zip(residuals.iter())
            .filter(|&(_, e)| (e / s).abs() > 2.5)
            .map(|(&(year, _), _)| year)
            .collect();
        (dw, jb_p, outliers)
    };

    let autocorrelation = if durbin_watson < 1.5 {
        Autocorrelation::Positive
    } else if durbin_watson > 2.5 {
        Autocorrelation::Negative
    } else {
        Autocorrelation::None
    };
    let trend_direction = if slope > 0.0 {
        TrendDirection::Increasing
    } else if slope < 0.0 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Flat
    };

    debug!(
        "fit_reappointment_trend: slope {:.6} p {:.4} r2 {:.4} dw {:.3}",
        slope, p_value, r_squared, durbin_watson
    );

    Ok(RegressionResult {
        slope,
        intercept,
        correlation,
        r_squared,
        p_value,
        std_err,
        confidence_interval,
        durbin_watson,
        autocorrelation,
        normality_p_value,
        outlier_years,
        trend_direction,
        is_significant: p_value < 0.05,
    })
}

/// Jarque-Bera p-value for a residual vector. The statistic is chi-square
/// with 2 degrees of freedom, whose upper tail is exactly exp(-x/2).
fn jarque_bera_p(residuals: &[f64]) -> f64 {
    let n = residuals.len() as f64;
    let m2 = residuals.iter().map(|e| e * e).sum::<f64>() / n;
    if m2 <= 0.0 {
        return 1.0;
    }
    let m3 = residuals.iter().map(|e| e * e * e).sum::<f64>() / n;
    let m4 = residuals.iter().map(|e| e * e * e * e).sum::<f64>() / n;
    let skew = m3 / m2.powf(1.5);
    let excess_kurtosis = m4 / (m2 * m2) - 3.0;
    let jb = n / 6.0 * (skew * skew + excess_kurtosis * excess_kurtosis / 4.0);
    (-jb / 2.0).exp()
}

/// Two-sided p-value of a Student t statistic, through the regularized
/// incomplete beta function: p = I_{df/(df+t^2)}(df/2, 1/2).
fn student_t_p_two_sided(t_abs: f64, df: f64) -> f64 {
    if !t_abs.is_finite() {
        return 0.0;
    }
    let x = df / (df + t_abs * t_abs);
    incomplete_beta(0.5 * df, 0.5, x).clamp(0.0, 1.0)
}

/// Critical t value for a two-sided interval at level alpha, found by
/// bisecting the p-value. Accurate far beyond reporting precision.
fn student_t_critical(df: f64, alpha: f64) -> f64 {
    let mut lo: f64 = 0.0;
    let mut hi: f64 = 1.0e3;
    while hi - lo > 1.0e-9 {
        let mid = 0.5 * (lo + hi);
        if student_t_p_two_sided(mid, df) > alpha {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Regularized incomplete beta function I_x(a, b), by the continued
/// fraction of Abramowitz & Stegun 26.5.8 with the symmetry transform for
/// fast convergence.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

// Modified Lentz evaluation of the continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3.0e-14;
    const FPMIN: f64 = 1.0e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;
    for m in 1..=MAX_ITER {
        let mf = m as f64;
        let m2 = 2.0 * mf;
        let aa = mf * (b - mf) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;
        let aa = -(a + mf) * (qab + mf) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Lanczos approximation of the log gamma function.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for c in COEFFS {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(start_year: i32, proportions: &[f64]) -> Vec<AnnualSummary> {
        proportions
            .iter()
            .enumerate()
            .map(|(i, &p)| AnnualSummary {
                year: start_year + i as i32,
                total_appointments: 100,
                total_reappointments: (p * 100.0) as u64,
                reappointment_proportion: Some(p),
            })
            .collect()
    }

    #[test]
    fn exact_linear_series_round_trips() {
        // proportion = 0.10 + 0.01 * (year - 2013) over the full range.
        let proportions: Vec<f64> = (0..12).map(|i| 0.10 + 0.01 * i as f64).collect();
        let fit = fit_reappointment_trend(&series(2013, &proportions)).unwrap();

        assert!((fit.slope - 0.01).abs() < 1e-9);
        assert!((fit.intercept - (0.10 - 0.01 * 2013.0)).abs() < 1e-6);
        assert!(fit.r_squared > 0.999_999);
        assert!(fit.p_value < 0.05);
        assert!(fit.is_significant);
        assert_eq!(fit.trend_direction, TrendDirection::Increasing);
        assert!(fit.outlier_years.is_empty());
        assert_eq!(fit.autocorrelation, Autocorrelation::None);
    }

    #[test]
    fn falling_series_is_decreasing() {
        let proportions: Vec<f64> = (0..8).map(|i| 0.30 - 0.02 * i as f64).collect();
        let fit = fit_reappointment_trend(&series(2013, &proportions)).unwrap();
        assert_eq!(fit.trend_direction, TrendDirection::Decreasing);
        assert!(fit.is_significant);
    }

    #[test]
    fn constant_series_is_flat_and_insignificant() {
        let fit = fit_reappointment_trend(&series(2013, &[0.25; 6])).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.trend_direction, TrendDirection::Flat);
        assert_eq!(fit.p_value, 1.0);
        assert!(!fit.is_significant);
        assert_eq!(fit.correlation, 0.0);
    }

    #[test]
    fn noisy_series_matches_the_textbook_fit() {
        // x = 2013..2017, y = [2, 4, 5, 4, 5]: slope 0.6, r^2 0.6,
        // t = 2.1213 on 3 degrees of freedom, p = 0.12408.
        let fit = fit_reappointment_trend(&series(2013, &[2.0, 4.0, 5.0, 4.0, 5.0])).unwrap();
        assert!((fit.slope - 0.6).abs() < 1e-9);
        assert!((fit.r_squared - 0.6).abs() < 1e-9);
        assert!((fit.p_value - 0.12408).abs() < 1e-3);
        assert!(!fit.is_significant);
        // t critical for df = 3 is 3.18245; the interval is slope +- t * se.
        let se = fit.std_err;
        assert!((fit.confidence_interval.0 - (0.6 - 3.18245 * se)).abs() < 1e-4);
        assert!((fit.confidence_interval.1 - (0.6 + 3.18245 * se)).abs() < 1e-4);
        assert!(fit.confidence_interval.0 < 0.0 && fit.confidence_interval.1 > 0.6);
    }

    #[test]
    fn alternating_residuals_read_as_negative_autocorrelation() {
        let proportions: Vec<f64> = (0..8)
            .map(|i| if i % 2 == 0 { 0.20 } else { 0.30 })
            .collect();
        let fit = fit_reappointment_trend(&series(2013, &proportions)).unwrap();
        assert!(fit.durbin_watson > 2.5);
        assert_eq!(fit.autocorrelation, Autocorrelation::Negative);
    }

    #[test]
    fn curved_residuals_read_as_positive_autocorrelation() {
        let proportions: Vec<f64> = (0..8)
            .map(|i| {
                let dx = i as f64 - 3.5;
                0.01 * dx * dx
            })
            .collect();
        let fit = fit_reappointment_trend(&series(2013, &proportions)).unwrap();
        assert!(fit.durbin_watson < 1.5);
        assert_eq!(fit.autocorrelation, Autocorrelation::Positive);
    }

    #[test]
    fn a_single_spike_is_flagged_as_outlier_and_breaks_normality() {
        let mut proportions = vec![0.2; 12];
        proportions[5] = 0.8; // 2018
        let fit = fit_reappointment_trend(&series(2013, &proportions)).unwrap();
        assert_eq!(fit.outlier_years, vec![2018]);
        assert!(fit.normality_p_value < 0.05);
    }

    #[test]
    fn short_series_are_rejected() {
        let err = fit_reappointment_trend(&series(2013, &[0.1, 0.2])).unwrap_err();
        assert_eq!(err, AnalysisErrors::InsufficientHistory { points: 2 });

        // Years without a defined proportion do not count towards the 3.
        let mut summaries = series(2013, &[0.1, 0.2]);
        summaries.push(AnnualSummary {
            year: 2015,
            total_appointments: 0,
            total_reappointments: 0,
            reappointment_proportion: None,
        });
        let err = fit_reappointment_trend(&summaries).unwrap_err();
        assert_eq!(err, AnalysisErrors::InsufficientHistory { points: 2 });
    }

    #[test]
    fn repeated_years_are_degenerate() {
        let summaries: Vec<AnnualSummary> = (0..3)
            .map(|i| AnnualSummary {
                year: 2015,
                total_appointments: 10,
                total_reappointments: i,
                reappointment_proportion: Some(i as f64 / 10.0),
            })
            .collect();
        assert_eq!(
            fit_reappointment_trend(&summaries).unwrap_err(),
            AnalysisErrors::DegenerateSeries
        );
    }

    #[test]
    fn t_distribution_helpers_agree_with_references() {
        // Standard two-sided critical values.
        assert!((student_t_critical(3.0, 0.05) - 3.18245).abs() < 1e-4);
        assert!((student_t_critical(10.0, 0.05) - 2.22814).abs() < 1e-4);
        // p for t = 2.1213 on 3 df (see the textbook fit above).
        assert!((student_t_p_two_sided(2.1213, 3.0) - 0.12408).abs() < 1e-3);
        // Large t collapses to zero, t = 0 to one.
        assert!(student_t_p_two_sided(0.0, 5.0) > 0.999_999);
        assert!(student_t_p_two_sided(1e8, 5.0) < 1e-6);
    }
}
