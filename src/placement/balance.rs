use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::model::{
    AcademicLevel, BehaviorLevel, ClassBucket, Factor, FactorSet, Gender, PlacementRequest, Strategy,
    Student,
};

const GENDER_IDEAL: [(Gender, f64); 3] = [(Gender::Male, 0.5), (Gender::Female, 0.5), (Gender::Other, 0.0)];

const ACADEMIC_IDEAL: [(AcademicLevel, f64); 4] = [
    (AcademicLevel::Advanced, 0.25),
    (AcademicLevel::Proficient, 0.25),
    (AcademicLevel::Basic, 0.25),
    (AcademicLevel::BelowBasic, 0.25),
];

/// (level, ideal ratio, deviation multiplier)
const BEHAVIOR_IDEAL: [(BehaviorLevel, f64, f64); 3] = [
    (BehaviorLevel::High, 0.2, 1.5),
    (BehaviorLevel::Medium, 0.3, 1.0),
    (BehaviorLevel::Low, 0.5, 0.5),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_students: usize,
    pub students_placed: usize,
    pub class_count: usize,
    pub average_class_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender_balance: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_balance: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior_balance: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_fulfilled: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_compatibility: Option<Vec<u32>>,
    pub weights: BTreeMap<Factor, f64>,
    pub overall_score: u32,
}

pub fn score(
    buckets: &[ClassBucket],
    roster: &[Student],
    factors: &FactorSet,
    strategy: Strategy,
) -> Statistics {
    let by_id: HashMap<&str, &Student> = roster.iter().map(|s| (s.id.as_str(), s)).collect();
    let members: Vec<Vec<&Student>> = buckets
        .iter()
        .map(|b| {
            b.students
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .collect()
        })
        .collect();

    let per_class = |f: fn(&[&Student]) -> u32| -> Vec<u32> { members.iter().map(|m| f(m)).collect() };

    let gender_balance = factors.contains(&Factor::Gender).then(|| per_class(gender_score));
    let academic_balance = factors
        .contains(&Factor::AcademicLevel)
        .then(|| per_class(academic_score));
    let behavior_balance = factors
        .contains(&Factor::BehaviorLevel)
        .then(|| per_class(behavior_score));
    let requests_fulfilled = factors
        .contains(&Factor::ParentRequests)
        .then(|| requests_fulfilled(buckets, roster));
    let teacher_compatibility = factors.contains(&Factor::TeacherCompatibility).then(|| {
        buckets
            .iter()
            .zip(&members)
            .map(|(b, m)| compatibility_score(b.teacher_id.as_deref(), m))
            .collect::<Vec<u32>>()
    });

    let weights = strategy.weights_for(factors);
    let mut weighted = 0.0_f64;
    let mut total_weight = 0.0_f64;
    let mut add = |factor: Factor, value: Option<f64>| {
        if let (Some(v), Some(w)) = (value, weights.get(&factor)) {
            weighted += v * *w;
            total_weight += *w;
        }
    };
    add(Factor::Gender, gender_balance.as_deref().map(mean));
    add(Factor::AcademicLevel, academic_balance.as_deref().map(mean));
    add(Factor::BehaviorLevel, behavior_balance.as_deref().map(mean));
    add(Factor::ParentRequests, requests_fulfilled.map(f64::from));
    add(Factor::TeacherCompatibility, teacher_compatibility.as_deref().map(mean));
    let overall_score = if total_weight > 0.0 {
        clamp_score(weighted / total_weight)
    } else {
        100
    };

    let total_students = roster.len();
    let class_count = buckets.len();
    let average_class_size = if class_count > 0 {
        (total_students as f64 / class_count as f64).round() as usize
    } else {
        0
    };

    Statistics {
        total_students,
        students_placed: buckets.iter().map(|b| b.students.len()).sum(),
        class_count,
        average_class_size,
        gender_balance,
        academic_balance,
        behavior_balance,
        requests_fulfilled,
        teacher_compatibility,
        weights,
        overall_score,
    }
}

fn mean(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 100.0;
    }
    values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64
}

fn clamp_score(x: f64) -> u32 {
    x.round().clamp(0.0, 100.0) as u32
}

fn ratio<F: Fn(&Student) -> bool>(members: &[&Student], pred: F) -> f64 {
    members.iter().filter(|s| pred(**s)).count() as f64 / members.len() as f64
}

/// Male/Female/Other against {0.5, 0.5, 0}. Ratios are over the whole
/// class, so `PreferNotToSay` only widens the denominator.
pub fn gender_score(members: &[&Student]) -> u32 {
    if members.is_empty() {
        return 100;
    }
    let deviation: f64 = GENDER_IDEAL
        .iter()
        .map(|(g, ideal)| (ratio(members, |s| s.gender == *g) - ideal).abs())
        .sum();
    clamp_score((1.0 - deviation / 2.0) * 100.0)
}

pub fn academic_score(members: &[&Student]) -> u32 {
    if members.is_empty() {
        return 100;
    }
    let deviation: f64 = ACADEMIC_IDEAL
        .iter()
        .map(|(l, ideal)| (ratio(members, |s| s.academic_level == *l) - ideal).abs())
        .sum();
    clamp_score((1.0 - deviation / 4.0) * 100.0)
}

pub fn behavior_score(members: &[&Student]) -> u32 {
    if members.is_empty() {
        return 100;
    }
    let weighted: f64 = BEHAVIOR_IDEAL
        .iter()
        .map(|(l, ideal, mult)| (ratio(members, |s| s.behavior_level == *l) - ideal).abs() * mult)
        .sum::<f64>()
        / 3.0;
    clamp_score((1.0 - weighted) * 100.0)
}

/// Mean compatibility (-1..=1) with the class teacher mapped to 0..=100.
pub fn compatibility_score(teacher_id: Option<&str>, members: &[&Student]) -> u32 {
    let Some(teacher_id) = teacher_id else {
        return 100;
    };
    if members.is_empty() {
        return 100;
    }
    let sum: f64 = members
        .iter()
        .map(|s| f64::from(s.compatibility_with(teacher_id)))
        .sum();
    let avg = sum / members.len() as f64;
    clamp_score((avg + 1.0) / 2.0 * 100.0)
}

/// Percent of students with at least one request whose every request is
/// met by the final assignment. 100 when nobody asked for anything.
pub fn requests_fulfilled(buckets: &[ClassBucket], roster: &[Student]) -> u32 {
    let mut bucket_of: HashMap<&str, usize> = HashMap::new();
    for (i, b) in buckets.iter().enumerate() {
        for s in &b.students {
            bucket_of.insert(s.as_str(), i);
        }
    }

    let mut asking = 0usize;
    let mut fulfilled = 0usize;
    for student in roster.iter().filter(|s| !s.parent_requests.is_empty()) {
        asking += 1;
        let own = bucket_of.get(student.id.as_str()).copied();
        let all_met = student.parent_requests.iter().all(|r| match (r, own) {
            (_, None) => false,
            (PlacementRequest::Teacher(t), Some(b)) => {
                buckets[b].teacher_id.as_deref() == Some(t.as_str())
            }
            (PlacementRequest::Classmate(c), Some(b)) => bucket_of.get(c.as_str()) == Some(&b),
        });
        if all_met {
            fulfilled += 1;
        }
    }

    if asking == 0 {
        return 100;
    }
    clamp_score(fulfilled as f64 * 100.0 / asking as f64)
}
