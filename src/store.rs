//! SQLite-backed roster, survey and request repositories, plus the atomic
//! class commit used at the end of an optimization run.

use rusqlite::{Connection, OptionalExtension, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::placement::model::{
    parse_factor_list, parse_strategy, AcademicLevel, BehaviorLevel, ClassBucket, ClassList, Gender,
    RequestKind, RequestStatus, Student, Tag, Teacher,
};
use crate::placement::{ParentRequest, PlacementError, TeacherSurvey};

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn class_list_exists(conn: &Connection, class_list_id: &str) -> Result<bool, PlacementError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM class_lists WHERE id = ?",
            [class_list_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn teacher_in_class_list(
    conn: &Connection,
    class_list_id: &str,
    teacher_id: &str,
) -> Result<bool, PlacementError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM teachers WHERE id = ? AND class_list_id = ?",
            (teacher_id, class_list_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn student_in_class_list(
    conn: &Connection,
    class_list_id: &str,
    student_id: &str,
) -> Result<bool, PlacementError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND class_list_id = ?",
            (student_id, class_list_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Bumps the optimistic version after any roster edit so an optimize run
/// computed on the old roster cannot commit over it.
pub fn touch_class_list(conn: &Connection, class_list_id: &str) -> Result<(), PlacementError> {
    conn.execute(
        "UPDATE class_lists SET version = version + 1 WHERE id = ?",
        [class_list_id],
    )?;
    Ok(())
}

pub fn load_class_list(conn: &Connection, class_list_id: &str) -> Result<ClassList, PlacementError> {
    let row: Option<(String, String, String, i64)> = conn
        .query_row(
            "SELECT name, factors_json, strategy, version FROM class_lists WHERE id = ?",
            [class_list_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((name, factors_json, strategy, version)) = row else {
        return Err(PlacementError::NotFound("class list".into()));
    };
    let factors_value: serde_json::Value = serde_json::from_str(&factors_json)
        .map_err(|e| PlacementError::invalid(format!("stored factors are not valid json: {e}")))?;
    let factors = parse_factor_list(&factors_value)?;
    let strategy = parse_strategy(&strategy)?;

    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, gender, academic_level, behavior_level, special_needs
         FROM students
         WHERE class_list_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let rows = stmt
        .query_map([class_list_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, i64>(6)? != 0,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut students = Vec::with_capacity(rows.len());
    for (id, first_name, last_name, gender, academic, behavior, special_needs) in rows {
        let bad = |field: &str, value: &str| {
            PlacementError::invalid(format!("student {id} has unknown {field}: {value}"))
        };
        let gender = Gender::parse(&gender).ok_or_else(|| bad("gender", &gender))?;
        let academic_level =
            AcademicLevel::parse(&academic).ok_or_else(|| bad("academicLevel", &academic))?;
        let behavior_level =
            BehaviorLevel::parse(&behavior).ok_or_else(|| bad("behaviorLevel", &behavior))?;
        let mut student = Student::new(id.clone(), gender, academic_level, behavior_level, special_needs);
        student.first_name = first_name;
        student.last_name = last_name;
        students.push(student);
    }

    let mut stmt = conn.prepare(
        "SELECT id, name FROM teachers WHERE class_list_id = ? ORDER BY sort_order, rowid",
    )?;
    let teachers = stmt
        .query_map([class_list_id], |r| {
            Ok(Teacher {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, teacher_id, name, capacity
         FROM classes
         WHERE class_list_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let mut buckets = stmt
        .query_map([class_list_id], |r| {
            Ok(ClassBucket {
                id: Some(r.get(0)?),
                teacher_id: r.get(1)?,
                name: r.get(2)?,
                // Out-of-range values fail the load instead of wrapping.
                capacity: r.get::<_, u32>(3)?,
                students: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut member_stmt = conn.prepare(
        "SELECT student_id FROM class_members WHERE class_id = ? ORDER BY sort_order",
    )?;
    for bucket in buckets.iter_mut() {
        let Some(class_id) = bucket.id.as_deref() else {
            continue;
        };
        bucket.students = member_stmt
            .query_map([class_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
    }

    Ok(ClassList {
        id: class_list_id.to_string(),
        name,
        students,
        buckets,
        teachers,
        factors,
        strategy,
        version,
    })
}

/// Surveys in submission order. Unreadable id lists count as empty.
pub fn find_surveys_for_class_list(
    conn: &Connection,
    class_list_id: &str,
) -> Result<Vec<TeacherSurvey>, PlacementError> {
    let mut stmt = conn.prepare(
        "SELECT teacher_id, preferred_json, challenging_json, submitted
         FROM teacher_surveys
         WHERE class_list_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([class_list_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)? != 0,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .map(|(teacher_id, preferred, challenging, submitted)| TeacherSurvey {
            preferred_students: parse_id_list(&teacher_id, &preferred),
            challenging_students: parse_id_list(&teacher_id, &challenging),
            teacher_id,
            submitted,
        })
        .collect())
}

fn parse_id_list(teacher_id: &str, raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(teacher = teacher_id, error = %e, "ignoring malformed survey list");
            Vec::new()
        }
    }
}

pub fn find_approved_requests(
    conn: &Connection,
    class_list_id: &str,
) -> Result<Vec<ParentRequest>, PlacementError> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, kind, target_teacher_id, target_student_id
         FROM parent_requests
         WHERE class_list_id = ? AND status = ?
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt
        .query_map((class_list_id, RequestStatus::Approved.as_str()), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, student_id, kind, target_teacher_id, target_student_id) in rows {
        let Some(kind) = RequestKind::parse(&kind) else {
            warn!(request = %id, kind = %kind, "skipping request with unknown kind");
            continue;
        };
        out.push(ParentRequest {
            id,
            student_id,
            kind,
            target_teacher_id,
            target_student_id,
            status: RequestStatus::Approved,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub version: i64,
    /// Ids of every committed class, in bucket order.
    pub class_ids: Vec<String>,
}

/// Replaces membership of existing classes and creates synthetic ones in
/// a single transaction. Nothing is written unless `expected_version`
/// still matches.
pub fn upsert_classes(
    conn: &Connection,
    class_list_id: &str,
    expected_version: i64,
    buckets: &[ClassBucket],
) -> Result<CommitOutcome, PlacementError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| PlacementError::Persistence(e.to_string()))?;

    match write_classes(&tx, class_list_id, expected_version, buckets) {
        Ok(outcome) => {
            tx.commit()
                .map_err(|e| PlacementError::Persistence(e.to_string()))?;
            Ok(outcome)
        }
        Err(e) => {
            let _ = tx.rollback();
            if matches!(e, PlacementError::Conflict { .. }) {
                warn!(class_list = class_list_id, expected_version, "commit rejected: stale version");
            }
            Err(e)
        }
    }
}

fn write_classes(
    tx: &Transaction<'_>,
    class_list_id: &str,
    expected_version: i64,
    buckets: &[ClassBucket],
) -> Result<CommitOutcome, PlacementError> {
    let persist = |e: rusqlite::Error| PlacementError::Persistence(e.to_string());

    let bumped = tx
        .execute(
            "UPDATE class_lists SET version = version + 1, optimized_at = ?
             WHERE id = ? AND version = ?",
            (now_rfc3339(), class_list_id, expected_version),
        )
        .map_err(persist)?;
    if bumped == 0 {
        if !class_list_exists(tx, class_list_id)? {
            return Err(PlacementError::NotFound("class list".into()));
        }
        return Err(PlacementError::Conflict {
            class_list_id: class_list_id.to_string(),
            expected: expected_version,
        });
    }

    let mut class_ids = Vec::with_capacity(buckets.len());
    for (sort_order, bucket) in buckets.iter().enumerate() {
        let class_id = match bucket.id.as_deref() {
            Some(id) => {
                let updated = tx
                    .execute(
                        "UPDATE classes SET teacher_id = ?, name = ?, capacity = ?, sort_order = ?
                         WHERE id = ? AND class_list_id = ?",
                        (
                            &bucket.teacher_id,
                            &bucket.name,
                            bucket.capacity as i64,
                            sort_order as i64,
                            id,
                            class_list_id,
                        ),
                    )
                    .map_err(persist)?;
                if updated == 0 {
                    return Err(PlacementError::Persistence(format!(
                        "class {id} does not belong to class list {class_list_id}"
                    )));
                }
                tx.execute("DELETE FROM class_members WHERE class_id = ?", [id])
                    .map_err(persist)?;
                id.to_string()
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO classes(id, class_list_id, teacher_id, name, capacity, sort_order)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (
                        &id,
                        class_list_id,
                        &bucket.teacher_id,
                        &bucket.name,
                        bucket.capacity as i64,
                        sort_order as i64,
                    ),
                )
                .map_err(persist)?;
                id
            }
        };

        for (i, student_id) in bucket.students.iter().enumerate() {
            tx.execute(
                "INSERT INTO class_members(class_id, student_id, sort_order) VALUES(?, ?, ?)",
                (&class_id, student_id, i as i64),
            )
            .map_err(persist)?;
        }
        class_ids.push(class_id);
    }

    let version: i64 = tx
        .query_row(
            "SELECT version FROM class_lists WHERE id = ?",
            [class_list_id],
            |r| r.get(0),
        )
        .map_err(persist)?;

    Ok(CommitOutcome { version, class_ids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use crate::placement::model::Factor;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute("PRAGMA foreign_keys = ON", []).expect("pragma");
        ensure_schema(&conn).expect("schema");
        conn.execute(
            "INSERT INTO class_lists(id, name, factors_json, strategy, version, created_at)
             VALUES('cl', 'Grade 2', '[\"gender\",\"parentRequests\"]', 'requests', 3, '2026-01-01T00:00:00Z')",
            [],
        )
        .expect("class list");
        for (i, t) in ["t1", "t2"].iter().enumerate() {
            conn.execute(
                "INSERT INTO teachers(id, class_list_id, name, sort_order) VALUES(?, 'cl', ?, ?)",
                (t, format!("Teacher {t}"), i as i64),
            )
            .expect("teacher");
        }
        let students = [
            ("s1", "Male", "Advanced", "Low", 0),
            ("s2", "Female", "Basic", "High", 1),
            ("s3", "Other", "BelowBasic", "Medium", 0),
        ];
        for (i, (id, g, a, b, sn)) in students.iter().enumerate() {
            conn.execute(
                "INSERT INTO students(id, class_list_id, first_name, last_name, gender, academic_level,
                   behavior_level, special_needs, sort_order)
                 VALUES(?, 'cl', 'First', 'Last', ?, ?, ?, ?, ?)",
                (id, g, a, b, sn, i as i64),
            )
            .expect("student");
        }
        conn
    }

    fn member_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM class_members", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn load_reads_roster_in_order() {
        let conn = setup();
        let list = load_class_list(&conn, "cl").expect("load");
        assert_eq!(list.version, 3);
        assert_eq!(list.students.len(), 3);
        assert_eq!(list.students[1].gender, Gender::Female);
        assert!(list.students[1].special_needs);
        assert_eq!(list.teachers[0].id, "t1");
        assert!(list.buckets.is_empty());
        assert!(list.factors.contains(&Factor::ParentRequests));
        assert_eq!(list.strategy.as_str(), "requests");
    }

    #[test]
    fn missing_class_list_is_not_found() {
        let conn = setup();
        let err = load_class_list(&conn, "nope").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn surveys_and_approved_requests_are_read() {
        let conn = setup();
        conn.execute(
            "INSERT INTO teacher_surveys(id, class_list_id, teacher_id, preferred_json, challenging_json, submitted, updated_at)
             VALUES('sv1', 'cl', 't1', '[\"s1\"]', 'not json', 1, 'now')",
            [],
        )
        .expect("survey");
        for (id, status) in [("r1", "approved"), ("r2", "pending")] {
            conn.execute(
                "INSERT INTO parent_requests(id, class_list_id, student_id, kind, target_teacher_id, status, created_at)
                 VALUES(?, 'cl', 's2', 'Teacher', 't2', ?, 'now')",
                (id, status),
            )
            .expect("request");
        }

        let surveys = find_surveys_for_class_list(&conn, "cl").expect("surveys");
        assert_eq!(surveys.len(), 1);
        assert_eq!(surveys[0].preferred_students, vec!["s1".to_string()]);
        assert!(surveys[0].challenging_students.is_empty());

        let requests = find_approved_requests(&conn, "cl").expect("requests");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, "r1");
        assert_eq!(requests[0].kind, RequestKind::Teacher);
    }

    fn synthetic(teacher: &str, students: &[&str]) -> ClassBucket {
        ClassBucket {
            id: None,
            teacher_id: Some(teacher.into()),
            name: format!("Class {teacher}"),
            capacity: 30,
            students: students.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn upsert_creates_then_replaces_membership() {
        let conn = setup();
        let first = upsert_classes(
            &conn,
            "cl",
            3,
            &[synthetic("t1", &["s1", "s2"]), synthetic("t2", &["s3"])],
        )
        .expect("first commit");
        assert_eq!(first.version, 4);
        assert_eq!(first.class_ids.len(), 2);

        let reloaded = load_class_list(&conn, "cl").expect("reload");
        assert_eq!(reloaded.buckets.len(), 2);
        assert_eq!(reloaded.buckets[0].students, vec!["s1".to_string(), "s2".to_string()]);

        let mut next = reloaded.buckets.clone();
        next[0].students = vec!["s3".into()];
        next[1].students = vec!["s1".into(), "s2".into()];
        let second = upsert_classes(&conn, "cl", 4, &next).expect("second commit");
        assert_eq!(second.class_ids, first.class_ids);
        assert_eq!(member_count(&conn), 3);

        let reloaded = load_class_list(&conn, "cl").expect("reload");
        assert_eq!(reloaded.buckets[1].students, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn stale_version_is_rejected_without_writes() {
        let conn = setup();
        let err = upsert_classes(&conn, "cl", 2, &[synthetic("t1", &["s1"])]).unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(member_count(&conn), 0);
        assert_eq!(load_class_list(&conn, "cl").expect("load").version, 3);
    }

    #[test]
    fn failed_commit_rolls_back_everything() {
        let conn = setup();
        // The second class references an unknown student, which violates
        // the class_members foreign key after the first class was written.
        let err = upsert_classes(
            &conn,
            "cl",
            3,
            &[synthetic("t1", &["s1"]), synthetic("t2", &["ghost"])],
        )
        .unwrap_err();
        assert_eq!(err.code(), "persistence_failed");

        let classes: i64 = conn
            .query_row("SELECT COUNT(*) FROM classes", [], |r| r.get(0))
            .expect("count");
        assert_eq!(classes, 0);
        assert_eq!(member_count(&conn), 0);
        assert_eq!(load_class_list(&conn, "cl").expect("load").version, 3);
    }

    #[test]
    fn capacity_outside_u32_fails_the_load() {
        let conn = setup();
        conn.execute(
            "INSERT INTO classes(id, class_list_id, teacher_id, name, capacity, sort_order)
             VALUES('c1', 'cl', 't1', 'Huge', 4294967296, 0)",
            [],
        )
        .expect("class");
        let err = load_class_list(&conn, "cl").unwrap_err();
        assert_eq!(err.code(), "db_query_failed");

        conn.execute("UPDATE classes SET capacity = 4294967295 WHERE id = 'c1'", [])
            .expect("update");
        let list = load_class_list(&conn, "cl").expect("load");
        assert_eq!(list.buckets[0].capacity, u32::MAX);
    }

    #[test]
    fn touch_bumps_version() {
        let conn = setup();
        touch_class_list(&conn, "cl").expect("touch");
        assert_eq!(load_class_list(&conn, "cl").expect("load").version, 4);
        assert!(class_list_exists(&conn, "cl").expect("exists"));
        assert!(!class_list_exists(&conn, "other").expect("exists"));
    }

    #[test]
    fn membership_checks_are_scoped_to_the_class_list() {
        let conn = setup();
        assert!(teacher_in_class_list(&conn, "cl", "t1").expect("teacher"));
        assert!(!teacher_in_class_list(&conn, "other", "t1").expect("teacher"));
        assert!(student_in_class_list(&conn, "cl", "s3").expect("student"));
        assert!(!student_in_class_list(&conn, "cl", "ghost").expect("student"));
    }
}
