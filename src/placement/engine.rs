//! Multi-phase greedy placement of a roster into class buckets.
//!
//! Phases run in a fixed order and never revisit an earlier phase:
//!
//! 1. special-needs seeding
//! 2. parent requests (teacher, then classmate)
//! 3. gender balancing
//! 4. academic-level balancing
//! 5. behavior-level balancing
//! 6. residual fill by total size
//! 7. one pass of pairwise size rebalancing
//!
//! Each phase only touches students that are not yet placed. Phases 1-6
//! only add members; phase 7 only moves them.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, warn};

use super::error::PlacementError;
use super::model::{
    ClassBucket, ClassList, Factor, FactorSet, PlacementRequest, Student, DEFAULT_CLASS_CAPACITY,
};
use super::pools::{Pool, PoolSet};

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Advisory capacity for synthetic buckets.
    pub default_capacity: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CLASS_CAPACITY,
        }
    }
}

/// A student moved by the final rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub student_id: String,
    pub from_class_index: usize,
    pub to_class_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub buckets: Vec<ClassBucket>,
    pub transfers: Vec<Transfer>,
}

/// Builds empty bucket state for a run.
///
/// Existing classes keep their identity but never their old membership.
/// A class list without classes gets one synthetic bucket per teacher.
pub fn fresh_buckets(
    class_list: &ClassList,
    options: &EngineOptions,
) -> Result<Vec<ClassBucket>, PlacementError> {
    if !class_list.buckets.is_empty() {
        return Ok(class_list
            .buckets
            .iter()
            .map(|b| ClassBucket {
                id: b.id.clone(),
                teacher_id: b.teacher_id.clone(),
                name: b.name.clone(),
                capacity: b.capacity,
                students: Vec::new(),
            })
            .collect());
    }

    if class_list.teachers.is_empty() {
        return Err(PlacementError::invalid(
            "class list has no classes and no teachers to create them from",
        ));
    }

    Ok(class_list
        .teachers
        .iter()
        .enumerate()
        .map(|(i, t)| ClassBucket {
            id: None,
            teacher_id: Some(t.id.clone()),
            name: format!("Class {}", i + 1),
            capacity: options.default_capacity,
            students: Vec::new(),
        })
        .collect())
}

/// Runs all phases. `buckets` must come from [`fresh_buckets`]; any
/// membership they carry is discarded.
pub fn place(
    roster: &[Student],
    buckets: Vec<ClassBucket>,
    pools: &PoolSet,
    factors: &FactorSet,
) -> Placement {
    let mut board = Board::new(roster, buckets.len());
    board.keep_special_needs = factors.contains(&Factor::SpecialNeeds);

    if let Some(sn) = &pools.special_needs {
        let n = board.seed_special_needs(sn);
        debug!(placed = n, "phase 1: special needs seeded");
    }

    if factors.contains(&Factor::ParentRequests) {
        let mut teacher_buckets: HashMap<&str, usize> = HashMap::new();
        for (i, b) in buckets.iter().enumerate() {
            if let Some(t) = b.teacher_id.as_deref() {
                teacher_buckets.entry(t).or_insert(i);
            }
        }
        let n = board.honor_requests(&teacher_buckets);
        debug!(placed = n, "phase 2: parent requests honored");
    }

    let n = board.balance_by(&pools.gender, |s| s.gender);
    debug!(placed = n, "phase 3: gender balanced");
    let n = board.balance_by(&pools.academic, |s| s.academic_level);
    debug!(placed = n, "phase 4: academic levels balanced");
    let n = board.balance_by(&pools.behavior, |s| s.behavior_level);
    debug!(placed = n, "phase 5: behavior levels balanced");

    let n = board.fill_residual();
    debug!(placed = n, "phase 6: residual students filled");

    let transfers: Vec<Transfer> = board
        .rebalance()
        .into_iter()
        .map(|(s, from, to)| Transfer {
            student_id: roster[s].id.clone(),
            from_class_index: from,
            to_class_index: to,
        })
        .collect();
    debug!(transfers = transfers.len(), "phase 7: sizes rebalanced");

    let buckets = buckets
        .into_iter()
        .zip(board.members)
        .map(|(bucket, members)| {
            let students: Vec<String> = members.iter().map(|&s| roster[s].id.clone()).collect();
            if students.len() > bucket.capacity as usize {
                warn!(
                    class = %bucket.name,
                    size = students.len(),
                    capacity = bucket.capacity,
                    "class exceeds its advisory capacity"
                );
            }
            ClassBucket { students, ..bucket }
        })
        .collect();

    Placement { buckets, transfers }
}

/// Working assignment state for one run. Students and buckets are
/// addressed by index; `bucket_of` doubles as the O(1) placed set.
struct Board<'a> {
    roster: &'a [Student],
    members: Vec<Vec<usize>>,
    bucket_of: Vec<Option<usize>>,
    index: HashMap<&'a str, usize>,
    /// Phase 7 avoids moving seeded special-needs students when set.
    keep_special_needs: bool,
}

impl<'a> Board<'a> {
    fn new(roster: &'a [Student], bucket_count: usize) -> Self {
        Self {
            roster,
            members: vec![Vec::new(); bucket_count],
            bucket_of: vec![None; roster.len()],
            index: roster
                .iter()
                .enumerate()
                .map(|(i, s)| (s.id.as_str(), i))
                .collect(),
            keep_special_needs: false,
        }
    }

    fn is_placed(&self, student: usize) -> bool {
        self.bucket_of[student].is_some()
    }

    fn assign(&mut self, student: usize, bucket: usize) {
        if self.is_placed(student) {
            return;
        }
        self.members[bucket].push(student);
        self.bucket_of[student] = Some(bucket);
    }

    fn unplaced<'p>(&'p self, pool: &'p [usize]) -> impl Iterator<Item = usize> + 'p {
        pool.iter().copied().filter(move |&s| !self.is_placed(s))
    }

    /// Contiguous runs of the pool: the first `n % m` buckets get
    /// `ceil(n / m)` students, the rest one fewer.
    fn seed_special_needs(&mut self, pool: &[usize]) -> usize {
        let pending: Vec<usize> = self.unplaced(pool).collect();
        let m = self.members.len();
        if pending.is_empty() || m == 0 {
            return 0;
        }
        let q = pending.len() / m;
        let r = pending.len() % m;
        let big_run = r * (q + 1);
        for (i, &s) in pending.iter().enumerate() {
            let bucket = if i < big_run {
                i / (q + 1)
            } else {
                r + (i - big_run) / q.max(1)
            };
            self.assign(s, bucket.min(m - 1));
        }
        pending.len()
    }

    /// Teacher requests for every student first, then classmate requests.
    /// A classmate request only succeeds if its target is already placed
    /// at that moment; it is not retried by later phases.
    fn honor_requests(&mut self, teacher_buckets: &HashMap<&str, usize>) -> usize {
        let roster = self.roster;
        let mut placed = 0;

        for s in 0..roster.len() {
            if self.is_placed(s) {
                continue;
            }
            let target = roster[s].parent_requests.iter().find_map(|r| match r {
                PlacementRequest::Teacher(t) => teacher_buckets.get(t.as_str()).copied(),
                PlacementRequest::Classmate(_) => None,
            });
            if let Some(b) = target {
                self.assign(s, b);
                placed += 1;
            }
        }

        for s in 0..roster.len() {
            if self.is_placed(s) {
                continue;
            }
            let target = roster[s].parent_requests.iter().find_map(|r| match r {
                PlacementRequest::Classmate(c) => self
                    .index
                    .get(c.as_str())
                    .and_then(|&t| self.bucket_of[t]),
                PlacementRequest::Teacher(_) => None,
            });
            if let Some(b) = target {
                self.assign(s, b);
                placed += 1;
            }
        }

        placed
    }

    /// For each pool in order, sends each unplaced member to the bucket
    /// holding the fewest students with the same key. Ties go to the lower
    /// bucket index.
    fn balance_by<K, F>(&mut self, pools: &[Pool<K>], key_of: F) -> usize
    where
        K: Copy + PartialEq,
        F: Fn(&Student) -> K,
    {
        let roster = self.roster;
        let mut placed = 0;
        for (key, pool) in pools {
            let pending: Vec<usize> = self.unplaced(pool).collect();
            if pending.is_empty() {
                continue;
            }
            let mut heap: BinaryHeap<Reverse<(usize, usize)>> = self
                .members
                .iter()
                .enumerate()
                .map(|(b, members)| {
                    let count = members
                        .iter()
                        .filter(|&&s| key_of(&roster[s]) == *key)
                        .count();
                    Reverse((count, b))
                })
                .collect();
            for s in pending {
                let Some(Reverse((count, b))) = heap.pop() else {
                    break;
                };
                self.assign(s, b);
                placed += 1;
                heap.push(Reverse((count + 1, b)));
            }
        }
        placed
    }

    fn fill_residual(&mut self) -> usize {
        let pending: Vec<usize> = (0..self.roster.len())
            .filter(|&s| !self.is_placed(s))
            .collect();
        let mut heap: BinaryHeap<Reverse<(usize, usize)>> = self
            .members
            .iter()
            .enumerate()
            .map(|(b, members)| Reverse((members.len(), b)))
            .collect();
        let mut placed = 0;
        for s in pending {
            let Some(Reverse((size, b))) = heap.pop() else {
                break;
            };
            self.assign(s, b);
            placed += 1;
            heap.push(Reverse((size + 1, b)));
        }
        placed
    }

    /// Single pass over (oversized, undersized) pairs, at most one move per
    /// pair. Returns `(student, from, to)` for each move.
    ///
    /// The moved student is the last one without parent requests. When the
    /// special-needs factor is on, special-needs students are never picked
    /// ahead of anyone else, even one with requests. Last resort is the
    /// bucket's last student.
    fn rebalance(&mut self) -> Vec<(usize, usize, usize)> {
        let roster = self.roster;
        let keep_sn = self.keep_special_needs;
        let free = |s: usize| roster[s].parent_requests.is_empty();
        let sizes: Vec<usize> = self.members.iter().map(Vec::len).collect();
        let (Some(&min), Some(&max)) = (sizes.iter().min(), sizes.iter().max()) else {
            return Vec::new();
        };
        if max - min <= 2 {
            return Vec::new();
        }

        let oversized: Vec<usize> = (0..sizes.len()).filter(|&b| sizes[b] > min + 1).collect();
        let undersized: Vec<usize> = (0..sizes.len()).filter(|&b| sizes[b] + 1 < max).collect();

        let mut moves = Vec::new();
        for &from in &oversized {
            for &to in &undersized {
                if from == to || self.members[from].len() < self.members[to].len() + 2 {
                    continue;
                }
                let source = &self.members[from];
                let movable = |s: usize| !(keep_sn && roster[s].special_needs);
                let pos = source
                    .iter()
                    .rposition(|&s| free(s) && movable(s))
                    .or_else(|| source.iter().rposition(|&s| movable(s)))
                    .unwrap_or(source.len() - 1);
                let s = self.members[from].remove(pos);
                self.members[to].push(s);
                self.bucket_of[s] = Some(to);
                moves.push((s, from, to));
            }
        }
        moves
    }
}
