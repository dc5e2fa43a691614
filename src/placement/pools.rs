use super::error::PlacementError;
use super::model::{AcademicLevel, BehaviorLevel, Factor, FactorSet, Gender, Student, Tag};

/// Roster indices grouped by one factor value, in roster order.
pub type Pool<K> = (K, Vec<usize>);

/// Per-factor partitions of the roster. A factor that was not requested
/// has no pools at all (empty vector / `None`), which is different from a
/// requested factor whose pools happen to be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolSet {
    pub gender: Vec<Pool<Gender>>,
    pub academic: Vec<Pool<AcademicLevel>>,
    pub behavior: Vec<Pool<BehaviorLevel>>,
    /// Special-needs students, when that factor is requested.
    pub special_needs: Option<Vec<usize>>,
}

pub fn build(roster: &[Student], factors: &FactorSet) -> Result<PoolSet, PlacementError> {
    if roster.is_empty() {
        return Err(PlacementError::invalid("class list has no students"));
    }

    let mut pools = PoolSet::default();
    if factors.contains(&Factor::Gender) {
        pools.gender = partition(roster, |s| s.gender);
    }
    if factors.contains(&Factor::AcademicLevel) {
        pools.academic = partition(roster, |s| s.academic_level);
    }
    if factors.contains(&Factor::BehaviorLevel) {
        pools.behavior = partition(roster, |s| s.behavior_level);
    }
    if factors.contains(&Factor::SpecialNeeds) {
        pools.special_needs = Some(
            (0..roster.len())
                .filter(|&i| roster[i].special_needs)
                .collect(),
        );
    }
    Ok(pools)
}

fn partition<K, F>(roster: &[Student], key_of: F) -> Vec<Pool<K>>
where
    K: Tag + PartialEq,
    F: Fn(&Student) -> K,
{
    K::ALL
        .iter()
        .map(|k| {
            let members = roster
                .iter()
                .enumerate()
                .filter(|&(_, s)| key_of(s) == *k)
                .map(|(i, _)| i)
                .collect();
            (*k, members)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<Student> {
        vec![
            Student::new("a", Gender::Male, AcademicLevel::Advanced, BehaviorLevel::Low, false),
            Student::new("b", Gender::Female, AcademicLevel::Basic, BehaviorLevel::High, true),
            Student::new("c", Gender::Male, AcademicLevel::Basic, BehaviorLevel::Low, false),
            Student::new("d", Gender::Other, AcademicLevel::BelowBasic, BehaviorLevel::Medium, true),
        ]
    }

    #[test]
    fn empty_roster_is_invalid() {
        let err = build(&[], &FactorSet::new()).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn only_requested_factors_get_pools() {
        let factors: FactorSet = [Factor::Gender].into_iter().collect();
        let pools = build(&roster(), &factors).expect("pools");
        assert_eq!(pools.gender.len(), 4);
        assert!(pools.academic.is_empty());
        assert!(pools.behavior.is_empty());
        assert!(pools.special_needs.is_none());
    }

    #[test]
    fn pools_partition_in_roster_order() {
        let factors: FactorSet = [Factor::Gender, Factor::AcademicLevel, Factor::SpecialNeeds]
            .into_iter()
            .collect();
        let pools = build(&roster(), &factors).expect("pools");

        assert_eq!(pools.gender[0], (Gender::Male, vec![0, 2]));
        assert_eq!(pools.gender[1], (Gender::Female, vec![1]));
        assert_eq!(pools.gender[2], (Gender::Other, vec![3]));
        assert_eq!(pools.gender[3], (Gender::PreferNotToSay, vec![]));

        assert_eq!(pools.academic[2], (AcademicLevel::Basic, vec![1, 2]));

        assert_eq!(pools.special_needs, Some(vec![1, 3]));

        // Every factor's pools cover the roster exactly once.
        let covered: usize = pools.academic.iter().map(|(_, m)| m.len()).sum();
        assert_eq!(covered, 4);
    }
}
