use serde::Serialize;
use serde_json::json;
use tracing::warn;

use super::model::{GradeSetting, Notice};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub low: f64,
    pub high: f64,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    fn intersects(&self, other: &Bounds) -> bool {
        self.low <= other.high && other.low <= self.high
    }

    fn is_whole(&self) -> bool {
        self.low.fract() == 0.0 && self.high.fract() == 0.0
    }
}

/// Parses an inclusive `LOW-HIGH` range such as `"80-100"` or `"59.5 - 69.4"`.
pub fn parse_range(raw: &str) -> Result<Bounds, String> {
    let s = raw.trim();
    let Some((lo, hi)) = s.split_once(|c| c == '-' || c == '\u{2013}') else {
        return Err(format!("range must look like LOW-HIGH: '{}'", raw));
    };
    let low: f64 = lo
        .trim()
        .parse()
        .map_err(|_| format!("range lower bound is not a number: '{}'", raw))?;
    let high: f64 = hi
        .trim()
        .parse()
        .map_err(|_| format!("range upper bound is not a number: '{}'", raw))?;
    if !low.is_finite() || !high.is_finite() {
        return Err(format!("range bounds must be finite: '{}'", raw));
    }
    if low > high {
        return Err(format!("range lower bound exceeds upper bound: '{}'", raw));
    }
    if low < 0.0 || high > 100.0 {
        return Err(format!("range must lie within 0-100: '{}'", raw));
    }
    Ok(Bounds { low, high })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    /// Index of the row in the configured scheme.
    pub position: usize,
    pub grade: String,
    pub remark: String,
    pub bounds: Bounds,
}

/// Parsed, immutable view of the configured grading scheme.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradingScheme {
    bands: Vec<GradeBand>,
    warnings: Vec<Notice>,
}

impl GradingScheme {
    pub fn from_settings(settings: &[GradeSetting]) -> Self {
        let mut bands = Vec::with_capacity(settings.len());
        let mut warnings = Vec::new();
        for (position, row) in settings.iter().enumerate() {
            match parse_range(&row.range) {
                Ok(bounds) => bands.push(GradeBand {
                    position,
                    grade: row.grade.clone(),
                    remark: row.remarks.clone(),
                    bounds,
                }),
                Err(message) => {
                    warn!(position, range = %row.range, "skipping malformed grade range");
                    warnings.push(malformed_notice(position, row, message));
                }
            }
        }
        Self { bands, warnings }
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    /// Malformed-row warnings collected while parsing.
    pub fn warnings(&self) -> &[Notice] {
        &self.warnings
    }

    pub fn is_whole_number(&self) -> bool {
        !self.bands.is_empty() && self.bands.iter().all(|b| b.bounds.is_whole())
    }

    /// First band, in configured order, whose inclusive bounds contain the
    /// percentage. Non-finite or out-of-range input never matches.
    pub fn resolve(&self, percentage: f64) -> Option<&GradeBand> {
        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return None;
        }
        self.bands.iter().find(|b| b.bounds.contains(percentage))
    }
}

fn malformed_notice(position: usize, row: &GradeSetting, message: String) -> Notice {
    Notice::new("malformed_grade_range", message).with_details(json!({
        "position": position,
        "grade": row.grade,
        "range": row.range,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedGrade {
    pub grade: String,
    pub remark: String,
    pub position: usize,
    pub bounds: Bounds,
}

/// Outcome of a one-shot lookup. `grade` is None when nothing matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub grade: Option<ResolvedGrade>,
    pub warnings: Vec<Notice>,
}

pub fn resolve(percentage: f64, settings: &[GradeSetting]) -> Resolution {
    let scheme = GradingScheme::from_settings(settings);
    let mut warnings = scheme.warnings().to_vec();
    if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
        warnings.push(
            Notice::new("percentage_out_of_range", "percentage must be a finite value in 0-100")
                .with_details(json!({ "percentage": percentage.to_string() })),
        );
    }
    let grade = scheme.resolve(percentage).map(|b| ResolvedGrade {
        grade: b.grade.clone(),
        remark: b.remark.clone(),
        position: b.position,
        bounds: b.bounds,
    });
    Resolution { grade, warnings }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlap {
    pub first: usize,
    pub second: usize,
    pub first_grade: String,
    pub second_grade: String,
}

/// Uncovered stretch of 0-100. Whole-number schemes report inclusive integer
/// bounds; decimal schemes report the open interval between neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Gap {
    pub from: f64,
    pub to: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeAudit {
    pub malformed: Vec<Notice>,
    pub overlaps: Vec<Overlap>,
    pub gaps: Vec<Gap>,
}

impl SchemeAudit {
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty() && self.overlaps.is_empty() && self.gaps.is_empty()
    }

    pub fn notices(&self) -> Vec<Notice> {
        let mut out = self.malformed.clone();
        for o in &self.overlaps {
            out.push(
                Notice::new(
                    "overlapping_grade_ranges",
                    format!(
                        "'{}' overlaps '{}'; the earlier row wins",
                        o.first_grade, o.second_grade
                    ),
                )
                .with_details(json!({ "first": o.first, "second": o.second })),
            );
        }
        for g in &self.gaps {
            out.push(
                Notice::new(
                    "grade_range_gap",
                    format!("no grade covers {}-{}", g.from, g.to),
                )
                .with_details(json!({ "from": g.from, "to": g.to })),
            );
        }
        out
    }
}

pub fn audit(settings: &[GradeSetting]) -> SchemeAudit {
    let scheme = GradingScheme::from_settings(settings);
    let bands = scheme.bands();

    let mut overlaps = Vec::new();
    for (i, a) in bands.iter().enumerate() {
        for b in &bands[i + 1..] {
            if a.bounds.intersects(&b.bounds) {
                overlaps.push(Overlap {
                    first: a.position,
                    second: b.position,
                    first_grade: a.grade.clone(),
                    second_grade: b.grade.clone(),
                });
            }
        }
    }

    let mut gaps = Vec::new();
    if bands.is_empty() {
        gaps.push(Gap { from: 0.0, to: 100.0 });
    } else {
        let whole = scheme.is_whole_number();
        let step = if whole { 1.0 } else { 0.0 };
        let mut sorted: Vec<&GradeBand> = bands.iter().collect();
        sorted.sort_by(|a, b| a.bounds.low.total_cmp(&b.bounds.low));

        // Highest value covered so far; starts just below 0.
        let mut covered = -step;
        for band in sorted {
            if band.bounds.low > covered + step {
                gaps.push(Gap {
                    from: covered + step,
                    to: band.bounds.low - step,
                });
            }
            covered = covered.max(band.bounds.high);
        }
        if covered < 100.0 {
            gaps.push(Gap {
                from: covered + step,
                to: 100.0,
            });
        }
    }

    SchemeAudit {
        malformed: scheme.warnings().to_vec(),
        overlaps,
        gaps,
    }
}
