//! Class placement: pools, compatibility tags, the phased engine and the
//! balance report. Everything here is pure; loading and committing live
//! in `crate::store`.

pub mod balance;
pub mod compat;
pub mod engine;
pub mod error;
pub mod model;
pub mod pools;

use serde::Serialize;
use tracing::info;

pub use balance::Statistics;
pub use compat::{ParentRequest, TeacherSurvey};
pub use engine::{EngineOptions, Transfer};
pub use error::PlacementError;
pub use model::{ClassBucket, ClassList, FactorSet, Strategy};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOutcome {
    pub id: Option<String>,
    pub teacher_id: Option<String>,
    pub name: String,
    pub student_ids: Vec<String>,
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub classes: Vec<ClassOutcome>,
    pub statistics: Statistics,
    pub transfers: Vec<Transfer>,
}

/// Output of a run before it is committed. `buckets` is what the store
/// persists; `result` is what the caller sees.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimization {
    pub buckets: Vec<ClassBucket>,
    pub result: OptimizationResult,
}

impl Optimization {
    /// Fills in ids for buckets the store just created, in bucket order.
    pub fn with_class_ids(mut self, ids: &[String]) -> Self {
        for ((bucket, class), id) in self
            .buckets
            .iter_mut()
            .zip(self.result.classes.iter_mut())
            .zip(ids)
        {
            bucket.id = Some(id.clone());
            class.id = Some(id.clone());
        }
        self
    }
}

pub fn optimize(
    class_list: &ClassList,
    surveys: &[TeacherSurvey],
    requests: &[ParentRequest],
    factors: &FactorSet,
    strategy: Strategy,
    options: &EngineOptions,
) -> Result<Optimization, PlacementError> {
    if class_list.students.is_empty() {
        return Err(PlacementError::invalid("class list has no students"));
    }
    let buckets = engine::fresh_buckets(class_list, options)?;

    let roster = compat::tag(&class_list.students, surveys, requests);
    let pools = pools::build(&roster, factors)?;
    let placement = engine::place(&roster, buckets, &pools, factors);
    let statistics = balance::score(&placement.buckets, &roster, factors, strategy);

    info!(
        class_list = %class_list.id,
        students = statistics.total_students,
        classes = statistics.class_count,
        transfers = placement.transfers.len(),
        overall = statistics.overall_score,
        "placement computed"
    );

    let classes = placement
        .buckets
        .iter()
        .map(|b| ClassOutcome {
            id: b.id.clone(),
            teacher_id: b.teacher_id.clone(),
            name: b.name.clone(),
            student_ids: b.students.clone(),
            is_new: b.is_new(),
        })
        .collect();

    Ok(Optimization {
        buckets: placement.buckets,
        result: OptimizationResult {
            classes,
            statistics,
            transfers: placement.transfers,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::model::{
        AcademicLevel, BehaviorLevel, Factor, Gender, RequestKind, RequestStatus, Student, Teacher,
    };

    fn class_list(students: Vec<Student>, teachers: usize) -> ClassList {
        ClassList {
            id: "cl-1".into(),
            name: "Grade 4".into(),
            students,
            buckets: Vec::new(),
            teachers: (0..teachers)
                .map(|i| Teacher {
                    id: format!("t{i}"),
                    name: format!("Teacher {i}"),
                })
                .collect(),
            factors: FactorSet::new(),
            strategy: Strategy::Balanced,
            version: 1,
        }
    }

    fn student(id: &str, gender: Gender) -> Student {
        Student::new(id, gender, AcademicLevel::Basic, BehaviorLevel::Medium, false)
    }

    #[test]
    fn empty_roster_fails_before_any_phase() {
        let list = class_list(Vec::new(), 2);
        let err = optimize(&list, &[], &[], &FactorSet::new(), Strategy::Balanced, &EngineOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn no_buckets_derivable_is_invalid() {
        let list = class_list(vec![student("a", Gender::Male)], 0);
        let err = optimize(&list, &[], &[], &FactorSet::new(), Strategy::Balanced, &EngineOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn gender_scenario_scores_at_least_80() {
        let mut students: Vec<Student> = (0..6).map(|i| student(&format!("m{i}"), Gender::Male)).collect();
        students.extend((0..4).map(|i| student(&format!("f{i}"), Gender::Female)));
        let list = class_list(students, 2);
        let factors: FactorSet = [Factor::Gender].into_iter().collect();

        let out = optimize(&list, &[], &[], &factors, Strategy::Balanced, &EngineOptions::default())
            .expect("optimize");
        let stats = &out.result.statistics;
        assert_eq!(stats.students_placed, 10);
        let scores = stats.gender_balance.clone().expect("gender balance");
        assert!(scores.iter().all(|s| *s >= 80), "{scores:?}");
        assert!(out.result.classes.iter().all(|c| c.is_new && c.id.is_none()));
    }

    #[test]
    fn late_classmate_target_counts_as_unfulfilled() {
        let students = vec![
            student("x", Gender::Male),
            student("a", Gender::Female),
            student("b", Gender::Male),
        ];
        let list = class_list(students, 2);
        let requests = vec![ParentRequest {
            id: "r1".into(),
            student_id: "a".into(),
            kind: RequestKind::Classmate,
            target_teacher_id: None,
            target_student_id: Some("b".into()),
            status: RequestStatus::Approved,
        }];
        let factors: FactorSet = [Factor::Gender, Factor::ParentRequests].into_iter().collect();

        let out = optimize(&list, &[], &requests, &factors, Strategy::Requests, &EngineOptions::default())
            .expect("optimize");
        assert_eq!(out.result.statistics.requests_fulfilled, Some(0));
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let students: Vec<Student> = (0..23)
            .map(|i| {
                Student::new(
                    format!("s{i}"),
                    if i % 3 == 0 { Gender::Female } else { Gender::Male },
                    if i % 2 == 0 { AcademicLevel::Advanced } else { AcademicLevel::Basic },
                    BehaviorLevel::Low,
                    i % 7 == 0,
                )
            })
            .collect();
        let list = class_list(students, 3);
        let factors = model::all_factors();
        let opts = EngineOptions::default();
        let a = optimize(&list, &[], &[], &factors, Strategy::Behavior, &opts).expect("first");
        let b = optimize(&list, &[], &[], &factors, Strategy::Behavior, &opts).expect("second");
        assert_eq!(a, b);
    }

    #[test]
    fn with_class_ids_fills_new_buckets() {
        let list = class_list(vec![student("a", Gender::Male), student("b", Gender::Female)], 2);
        let out = optimize(&list, &[], &[], &FactorSet::new(), Strategy::Balanced, &EngineOptions::default())
            .expect("optimize")
            .with_class_ids(&["c1".to_string(), "c2".to_string()]);
        assert_eq!(out.buckets[1].id.as_deref(), Some("c2"));
        assert_eq!(out.result.classes[0].id.as_deref(), Some("c1"));
        assert!(out.result.classes[0].is_new);
    }
}
