use crate::ipc::error::{err, ok, placement_err};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::placement::model::{all_factors, parse_factor_list, parse_strategy, Student, Strategy, Tag};
use crate::store;
use serde_json::json;
use uuid::Uuid;

fn handle_class_lists_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classLists": [] }));
    };

    // Correlated subqueries keep each count independent of the others.
    let mut stmt = match conn.prepare(
        "SELECT
           cl.id,
           cl.name,
           cl.strategy,
           cl.version,
           cl.optimized_at,
           (SELECT COUNT(*) FROM students s WHERE s.class_list_id = cl.id) AS student_count,
           (SELECT COUNT(*) FROM teachers t WHERE t.class_list_id = cl.id) AS teacher_count,
           (SELECT COUNT(*) FROM classes c WHERE c.class_list_id = cl.id) AS class_count,
           (SELECT COUNT(*) FROM parent_requests pr
              WHERE pr.class_list_id = cl.id AND pr.status = 'pending') AS pending_requests
         FROM class_lists cl
         ORDER BY cl.name, cl.created_at",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let strategy: String = row.get(2)?;
            let version: i64 = row.get(3)?;
            let optimized_at: Option<String> = row.get(4)?;
            let student_count: i64 = row.get(5)?;
            let teacher_count: i64 = row.get(6)?;
            let class_count: i64 = row.get(7)?;
            let pending_requests: i64 = row.get(8)?;
            Ok(json!({
                "id": id,
                "name": name,
                "strategy": strategy,
                "version": version,
                "optimizedAt": optimized_at,
                "studentCount": student_count,
                "teacherCount": teacher_count,
                "classCount": class_count,
                "pendingRequestCount": pending_requests
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(lists) => ok(&req.id, json!({ "classLists": lists })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_class_lists_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let factors = match req.params.get("factors") {
        None => all_factors(),
        Some(v) if v.is_null() => all_factors(),
        Some(v) => match parse_factor_list(v) {
            Ok(f) => f,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        },
    };
    let strategy = match req.params.get("strategy").and_then(|v| v.as_str()) {
        None => Strategy::default(),
        Some(raw) => match parse_strategy(raw) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        },
    };
    let factor_tags: Vec<&str> = factors.iter().map(|f| f.as_str()).collect();
    let factors_json = json!(factor_tags).to_string();

    let class_list_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO class_lists(id, name, factors_json, strategy, version, created_at)
         VALUES(?, ?, ?, ?, 0, ?)",
        (
            &class_list_id,
            &name,
            &factors_json,
            strategy.as_str(),
            store::now_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "class_lists" })),
        );
    }

    ok(
        &req.id,
        json!({
            "classListId": class_list_id,
            "name": name,
            "factors": factor_tags,
            "strategy": strategy.as_str(),
        }),
    )
}

pub fn student_json(s: &Student) -> serde_json::Value {
    json!({
        "id": s.id,
        "firstName": s.first_name,
        "lastName": s.last_name,
        "gender": s.gender.as_str(),
        "academicLevel": s.academic_level.as_str(),
        "behaviorLevel": s.behavior_level.as_str(),
        "specialNeeds": s.special_needs,
    })
}

fn handle_class_lists_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_str(req, "classListId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let list = match store::load_class_list(conn, &class_list_id) {
        Ok(l) => l,
        Err(e) => return placement_err(&req.id, &e),
    };

    let factors: Vec<&str> = list.factors.iter().map(|f| f.as_str()).collect();
    let students: Vec<serde_json::Value> = list.students.iter().map(student_json).collect();
    let teachers: Vec<serde_json::Value> = list
        .teachers
        .iter()
        .map(|t| json!({ "id": t.id, "name": t.name }))
        .collect();
    let classes: Vec<serde_json::Value> = list
        .buckets
        .iter()
        .map(|b| {
            json!({
                "id": b.id,
                "teacherId": b.teacher_id,
                "name": b.name,
                "capacity": b.capacity,
                "studentIds": b.students,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "classList": {
                "id": list.id,
                "name": list.name,
                "factors": factors,
                "strategy": list.strategy.as_str(),
                "version": list.version,
            },
            "students": students,
            "teachers": teachers,
            "classes": classes,
        }),
    )
}

fn handle_class_lists_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_str(req, "classListId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store::class_list_exists(conn, &class_list_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class list not found", None),
        Err(e) => return placement_err(&req.id, &e),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Dependency order; there is no ON DELETE CASCADE.
    let steps: [(&str, &str); 7] = [
        (
            "class_members",
            "DELETE FROM class_members
             WHERE class_id IN (SELECT id FROM classes WHERE class_list_id = ?)",
        ),
        ("classes", "DELETE FROM classes WHERE class_list_id = ?"),
        ("parent_requests", "DELETE FROM parent_requests WHERE class_list_id = ?"),
        ("teacher_surveys", "DELETE FROM teacher_surveys WHERE class_list_id = ?"),
        ("students", "DELETE FROM students WHERE class_list_id = ?"),
        ("teachers", "DELETE FROM teachers WHERE class_list_id = ?"),
        ("class_lists", "DELETE FROM class_lists WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&class_list_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classLists.list" => Some(handle_class_lists_list(state, req)),
        "classLists.create" => Some(handle_class_lists_create(state, req)),
        "classLists.open" => Some(handle_class_lists_open(state, req)),
        "classLists.delete" => Some(handle_class_lists_delete(state, req)),
        _ => None,
    }
}
