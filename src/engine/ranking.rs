use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::EngineError;
use super::model::{round_off_1_decimal, Student, StudentTermSummary, SubjectAggregate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankScope {
    Class,
    School,
}

impl RankScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "class" => Some(Self::Class),
            "school" => Some(Self::School),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::School => "school",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RankOutcome {
    pub ranked: usize,
    pub excluded: usize,
}

/// Builds a student's term summary. Subjects without recorded scores are
/// left out of the total and the average instead of counting as zero.
pub fn summarize(
    student: &Student,
    term_id: &str,
    aggregates: Vec<SubjectAggregate>,
) -> StudentTermSummary {
    let recorded: Vec<f64> = aggregates
        .iter()
        .filter(|a| a.is_recorded())
        .filter_map(|a| a.percentage)
        .collect();
    let failed_subject_count = aggregates
        .iter()
        .filter(|a| a.is_recorded() && a.failed)
        .count();
    let total: f64 = recorded.iter().sum();
    let overall_average = if recorded.is_empty() {
        None
    } else {
        Some(round_off_1_decimal(total / (recorded.len() as f64)))
    };

    StudentTermSummary {
        student_id: student.id.clone(),
        class_id: student.class_id.clone(),
        term_id: term_id.to_string(),
        enrollment_order: student.enrollment_order,
        subject_aggregates: aggregates,
        recorded_subject_count: recorded.len(),
        overall_average,
        overall_total: round_off_1_decimal(total),
        class_rank: None,
        school_rank: None,
        failed_subject_count,
    }
}

fn standing_cmp(a: &StudentTermSummary, b: &StudentTermSummary) -> Ordering {
    let avg_a = a.overall_average.unwrap_or(f64::NEG_INFINITY);
    let avg_b = b.overall_average.unwrap_or(f64::NEG_INFINITY);
    avg_b
        .total_cmp(&avg_a)
        .then_with(|| a.failed_subject_count.cmp(&b.failed_subject_count))
        .then_with(|| a.enrollment_order.cmp(&b.enrollment_order))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

fn shares_rank(a: &StudentTermSummary, b: &StudentTermSummary) -> bool {
    match (a.overall_average, b.overall_average) {
        (Some(x), Some(y)) => {
            x.total_cmp(&y) == Ordering::Equal && a.failed_subject_count == b.failed_subject_count
        }
        _ => false,
    }
}

fn set_rank(summary: &mut StudentTermSummary, scope: RankScope, rank: Option<u32>) {
    match scope {
        RankScope::Class => summary.class_rank = rank,
        RankScope::School => summary.school_rank = rank,
    }
}

/// Populates the rank field for `scope` using competition ranking (1, 1, 3).
///
/// Class scope ranks every class present in `summaries` independently;
/// school scope ranks them all together. Students with no recorded subjects
/// are left unranked. The other scope's field is never touched, and earlier
/// values for this scope are discarded, so repeated calls are stable.
pub fn rank(summaries: &mut [StudentTermSummary], scope: RankScope) -> Result<RankOutcome, EngineError> {
    if summaries.is_empty() {
        return Err(EngineError::EmptyRoster(format!("{} ranking", scope.as_str())));
    }

    for s in summaries.iter_mut() {
        set_rank(s, scope, None);
    }

    let mut partitions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, s) in summaries.iter().enumerate() {
        if !s.has_recorded_subjects() || s.overall_average.is_none() {
            continue;
        }
        let key = match scope {
            RankScope::Class => s.class_id.as_str(),
            RankScope::School => "",
        };
        partitions.entry(key).or_default().push(i);
    }

    let mut assignments: Vec<(usize, u32)> = Vec::new();
    for (partition, mut members) in partitions {
        members.sort_by(|&a, &b| standing_cmp(&summaries[a], &summaries[b]));
        let mut current = 0_u32;
        for (pos, &idx) in members.iter().enumerate() {
            if pos == 0 || !shares_rank(&summaries[members[pos - 1]], &summaries[idx]) {
                current = (pos as u32) + 1;
            }
            assignments.push((idx, current));
        }
        debug!(scope = scope.as_str(), partition, ranked = members.len(), "ranked partition");
    }

    let outcome = RankOutcome {
        ranked: assignments.len(),
        excluded: summaries.len() - assignments.len(),
    };
    for (idx, r) in assignments {
        set_rank(&mut summaries[idx], scope, Some(r));
    }
    Ok(outcome)
}
