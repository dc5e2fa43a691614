use std::collections::HashMap;

use super::model::{PlacementRequest, RequestKind, RequestStatus, Student, StudentId, TeacherId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherSurvey {
    pub teacher_id: TeacherId,
    pub preferred_students: Vec<StudentId>,
    pub challenging_students: Vec<StudentId>,
    pub submitted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRequest {
    pub id: String,
    pub student_id: StudentId,
    pub kind: RequestKind,
    pub target_teacher_id: Option<TeacherId>,
    pub target_student_id: Option<StudentId>,
    pub status: RequestStatus,
}

impl ParentRequest {
    fn to_placement_request(&self) -> Option<PlacementRequest> {
        match self.kind {
            RequestKind::Teacher => self
                .target_teacher_id
                .clone()
                .map(PlacementRequest::Teacher),
            RequestKind::Classmate => self
                .target_student_id
                .clone()
                .map(PlacementRequest::Classmate),
        }
    }
}

/// Returns a copy of the roster annotated with survey preferences and
/// approved parent requests. Input students are never modified.
///
/// Every teacher with a submitted survey gets an explicit entry on every
/// student (0 when the survey does not mention them). Ids that are not on
/// the roster are ignored.
pub fn tag(roster: &[Student], surveys: &[TeacherSurvey], requests: &[ParentRequest]) -> Vec<Student> {
    let mut out: Vec<Student> = roster.to_vec();
    let index: HashMap<&str, usize> = roster
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    for survey in surveys.iter().filter(|s| s.submitted) {
        for student in out.iter_mut() {
            student
                .teacher_compatibility
                .insert(survey.teacher_id.clone(), 0);
        }
        for sid in &survey.preferred_students {
            if let Some(&i) = index.get(sid.as_str()) {
                out[i]
                    .teacher_compatibility
                    .insert(survey.teacher_id.clone(), 1);
            }
        }
        // Challenging wins over preferred when a teacher lists both.
        for sid in &survey.challenging_students {
            if let Some(&i) = index.get(sid.as_str()) {
                out[i]
                    .teacher_compatibility
                    .insert(survey.teacher_id.clone(), -1);
            }
        }
    }

    for req in requests
        .iter()
        .filter(|r| r.status == RequestStatus::Approved)
    {
        let Some(&i) = index.get(req.student_id.as_str()) else {
            continue;
        };
        if let Some(p) = req.to_placement_request() {
            out[i].parent_requests.push(p);
        }
    }

    out
}
