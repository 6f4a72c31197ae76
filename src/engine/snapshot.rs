use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::model::{
    AssignmentScore, ClassInfo, EngineSettings, GradeSetting, PromotionCriteria, Student, Subject,
    Term,
};

/// Point-in-time copy of every input a term computation reads. The engine
/// only ever sees an owned snapshot, so configuration edits made while a
/// report is being generated cannot leak into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermSnapshot {
    pub term: Term,
    pub classes: Vec<ClassInfo>,
    pub subjects: Vec<Subject>,
    pub students: Vec<Student>,
    pub scores: Vec<AssignmentScore>,
    pub grading_scheme: Vec<GradeSetting>,
    pub criteria: Option<PromotionCriteria>,
    /// Attendance percent per student id.
    pub attendance: BTreeMap<String, f64>,
    pub settings: EngineSettings,
}

impl TermSnapshot {
    pub fn class(&self, class_id: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }

    /// Hex sha256 of the snapshot's JSON form. Identical inputs always
    /// produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
