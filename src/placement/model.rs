use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::error::PlacementError;

pub type StudentId = String;
pub type TeacherId = String;

pub const DEFAULT_CLASS_CAPACITY: u32 = 30;

/// Closed vocabulary stored and sent in one canonical spelling.
///
/// Parsing is lenient (case, `_`, `-` and spaces are ignored) so
/// `"below_basic"`, `"BelowBasic"` and `"below basic"` all resolve to the
/// same value; output always uses [`Tag::as_str`].
pub trait Tag: Copy + Sized + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(raw: &str) -> Option<Self> {
        let wanted = fold_tag(raw);
        Self::ALL
            .iter()
            .copied()
            .find(|v| fold_tag(v.as_str()) == wanted)
    }
}

fn fold_tag(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

impl Tag for Gender {
    const ALL: &'static [Self] = &[Self::Male, Self::Female, Self::Other, Self::PreferNotToSay];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Other => "Other",
            Self::PreferNotToSay => "PreferNotToSay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AcademicLevel {
    Advanced,
    Proficient,
    Basic,
    BelowBasic,
}

impl Tag for AcademicLevel {
    const ALL: &'static [Self] = &[Self::Advanced, Self::Proficient, Self::Basic, Self::BelowBasic];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Advanced => "Advanced",
            Self::Proficient => "Proficient",
            Self::Basic => "Basic",
            Self::BelowBasic => "BelowBasic",
        }
    }
}

/// Level of support a student needs, not a judgement of conduct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BehaviorLevel {
    High,
    Medium,
    Low,
}

impl Tag for BehaviorLevel {
    const ALL: &'static [Self] = &[Self::High, Self::Medium, Self::Low];

    fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Factor {
    Gender,
    AcademicLevel,
    BehaviorLevel,
    SpecialNeeds,
    TeacherCompatibility,
    ParentRequests,
}

impl Tag for Factor {
    const ALL: &'static [Self] = &[
        Self::Gender,
        Self::AcademicLevel,
        Self::BehaviorLevel,
        Self::SpecialNeeds,
        Self::TeacherCompatibility,
        Self::ParentRequests,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Gender => "gender",
            Self::AcademicLevel => "academicLevel",
            Self::BehaviorLevel => "behaviorLevel",
            Self::SpecialNeeds => "specialNeeds",
            Self::TeacherCompatibility => "teacherCompatibility",
            Self::ParentRequests => "parentRequests",
        }
    }
}

pub type FactorSet = BTreeSet<Factor>;

pub fn all_factors() -> FactorSet {
    Factor::ALL.iter().copied().collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    #[default]
    Balanced,
    Academic,
    Behavior,
    Requests,
}

impl Tag for Strategy {
    const ALL: &'static [Self] = &[Self::Balanced, Self::Academic, Self::Behavior, Self::Requests];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Academic => "academic",
            Self::Behavior => "behavior",
            Self::Requests => "requests",
        }
    }
}

impl Strategy {
    /// Reporting emphasis per factor. Placement order never depends on it.
    pub fn weight(&self, factor: Factor) -> f64 {
        use Factor::*;
        match (self, factor) {
            (_, Gender) => 1.0,
            (Self::Academic, AcademicLevel) => 2.0,
            (Self::Behavior, BehaviorLevel) => 2.0,
            (Self::Behavior, SpecialNeeds) => 1.5,
            (Self::Requests, ParentRequests) => 2.0,
            (Self::Requests, TeacherCompatibility) => 1.5,
            _ => 1.0,
        }
    }

    pub fn weights_for(&self, factors: &FactorSet) -> BTreeMap<Factor, f64> {
        factors.iter().map(|f| (*f, self.weight(*f))).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Teacher,
    Classmate,
}

impl Tag for RequestKind {
    const ALL: &'static [Self] = &[Self::Teacher, Self::Classmate];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "Teacher",
            Self::Classmate => "Classmate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl Tag for RequestStatus {
    const ALL: &'static [Self] = &[Self::Pending, Self::Approved, Self::Rejected];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// A parent request as carried on a student during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementRequest {
    Teacher(TeacherId),
    Classmate(StudentId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub id: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub academic_level: AcademicLevel,
    pub behavior_level: BehaviorLevel,
    pub special_needs: bool,
    pub teacher_compatibility: BTreeMap<TeacherId, i8>,
    pub parent_requests: Vec<PlacementRequest>,
}

impl Student {
    pub fn new(
        id: impl Into<StudentId>,
        gender: Gender,
        academic_level: AcademicLevel,
        behavior_level: BehaviorLevel,
        special_needs: bool,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: String::new(),
            last_name: String::new(),
            gender,
            academic_level,
            behavior_level,
            special_needs,
            teacher_compatibility: BTreeMap::new(),
            parent_requests: Vec::new(),
        }
    }

    pub fn compatibility_with(&self, teacher_id: &str) -> i8 {
        self.teacher_compatibility
            .get(teacher_id)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
}

/// One class in formation. `id` is `None` until the store creates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassBucket {
    pub id: Option<String>,
    pub teacher_id: Option<TeacherId>,
    pub name: String,
    pub capacity: u32,
    #[serde(rename = "studentIds")]
    pub students: Vec<StudentId>,
}

impl ClassBucket {
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ClassList {
    pub id: String,
    pub name: String,
    pub students: Vec<Student>,
    pub buckets: Vec<ClassBucket>,
    pub teachers: Vec<Teacher>,
    pub factors: FactorSet,
    pub strategy: Strategy,
    pub version: i64,
}

/// Parses a JSON array of factor tags. Unknown tags are rejected rather
/// than dropped so a typo cannot silently disable a phase.
pub fn parse_factor_list(raw: &serde_json::Value) -> Result<FactorSet, PlacementError> {
    let Some(items) = raw.as_array() else {
        return Err(PlacementError::invalid("factors must be an array of strings"));
    };
    let mut out = FactorSet::new();
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(PlacementError::invalid("factors must be an array of strings"));
        };
        let Some(f) = Factor::parse(s) else {
            return Err(PlacementError::invalid(format!("unknown factor: {s}")));
        };
        out.insert(f);
    }
    Ok(out)
}

pub fn parse_strategy(raw: &str) -> Result<Strategy, PlacementError> {
    Strategy::parse(raw).ok_or_else(|| PlacementError::invalid(format!("unknown strategy: {raw}")))
}
