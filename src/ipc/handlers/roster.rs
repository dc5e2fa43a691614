use crate::ipc::error::{err, ok, placement_err};
use crate::ipc::helpers::{
    optional_str, require_db, required_class_list, required_str, required_tag, roster_edit, Reply,
};
use crate::ipc::types::{AppState, Request};
use crate::placement::model::{AcademicLevel, BehaviorLevel, Gender, Tag};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn next_sort_order(conn: &Connection, table: &str, class_list_id: &str) -> rusqlite::Result<i64> {
    let sql = format!(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM {} WHERE class_list_id = ?",
        table
    );
    conn.query_row(&sql, [class_list_id], |r| r.get(0))
}

fn insert_failed(req: &Request, table: &str, e: rusqlite::Error) -> Reply {
    err(
        &req.id,
        "db_insert_failed",
        e.to_string(),
        Some(json!({ "table": table })),
    )
}

fn sort_order_for(
    conn: &Connection,
    req: &Request,
    table: &str,
    class_list_id: &str,
) -> Result<i64, Reply> {
    next_sort_order(conn, table, class_list_id)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_class_list(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let teacher_id = Uuid::new_v4().to_string();
    let written = roster_edit(conn, req, &class_list_id, |tx| {
        let sort_order = sort_order_for(tx, req, "teachers", &class_list_id)?;
        tx.execute(
            "INSERT INTO teachers(id, class_list_id, name, sort_order) VALUES(?, ?, ?, ?)",
            (&teacher_id, &class_list_id, &name, sort_order),
        )
        .map_err(|e| insert_failed(req, "teachers", e))
    });
    if let Err(e) = written {
        return e;
    }

    ok(&req.id, json!({ "teacherId": teacher_id, "name": name }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_class_list(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let gender: Gender = match required_tag(req, "gender") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let academic_level: AcademicLevel = match required_tag(req, "academicLevel") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let behavior_level: BehaviorLevel = match required_tag(req, "behaviorLevel") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let special_needs = req
        .params
        .get("specialNeeds")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let student_id = Uuid::new_v4().to_string();
    let written = roster_edit(conn, req, &class_list_id, |tx| {
        let sort_order = sort_order_for(tx, req, "students", &class_list_id)?;
        tx.execute(
            "INSERT INTO students(id, class_list_id, first_name, last_name, gender, academic_level,
               behavior_level, special_needs, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &student_id,
                &class_list_id,
                &first_name,
                &last_name,
                gender.as_str(),
                academic_level.as_str(),
                behavior_level.as_str(),
                special_needs as i64,
                sort_order,
            ),
        )
        .map_err(|e| insert_failed(req, "students", e))
    });
    if let Err(e) = written {
        return e;
    }

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "gender": gender.as_str(),
            "academicLevel": academic_level.as_str(),
            "behaviorLevel": behavior_level.as_str(),
            "specialNeeds": special_needs,
        }),
    )
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_class_list(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = optional_str(req, "teacherId");
    if let Some(t) = teacher_id.as_deref() {
        match store::teacher_in_class_list(conn, &class_list_id, t) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
            Err(e) => return placement_err(&req.id, &e),
        }
    }
    // Stored capacities must load back as u32.
    let capacity: u32 = match req.params.get("capacity") {
        None => state.config.default_capacity,
        Some(v) if v.is_null() => state.config.default_capacity,
        Some(v) => match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) if n > 0 => n,
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("capacity must be an integer from 1 to {}", u32::MAX),
                    None,
                )
            }
        },
    };

    let class_id = Uuid::new_v4().to_string();
    let written = roster_edit(conn, req, &class_list_id, |tx| {
        let sort_order = sort_order_for(tx, req, "classes", &class_list_id)?;
        tx.execute(
            "INSERT INTO classes(id, class_list_id, teacher_id, name, capacity, sort_order)
             VALUES(?, ?, ?, ?, ?, ?)",
            (&class_id, &class_list_id, &teacher_id, &name, capacity, sort_order),
        )
        .map_err(|e| insert_failed(req, "classes", e))
    });
    if let Err(e) = written {
        return e;
    }

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "teacherId": teacher_id,
            "name": name,
            "capacity": capacity,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        _ => None,
    }
}
