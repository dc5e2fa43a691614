use crate::ipc::error::{err, ok, placement_err};
use crate::ipc::helpers::{require_db, required_class_list, required_str, roster_edit, string_list};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use uuid::Uuid;

fn handle_surveys_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_class_list(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::teacher_in_class_list(conn, &class_list_id, &teacher_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
        Err(e) => return placement_err(&req.id, &e),
    }
    let preferred = match string_list(req, "preferredStudents") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let challenging = match string_list(req, "challengingStudents") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let submitted = req
        .params
        .get("submitted")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    for student_id in preferred.iter().chain(challenging.iter()) {
        match store::student_in_class_list(conn, &class_list_id, student_id) {
            Ok(true) => {}
            Ok(false) => {
                return err(
                    &req.id,
                    "not_found",
                    "student not found",
                    Some(json!({ "studentId": student_id })),
                )
            }
            Err(e) => return placement_err(&req.id, &e),
        }
    }

    let preferred_json = json!(preferred).to_string();
    let challenging_json = json!(challenging).to_string();
    let written = roster_edit(conn, req, &class_list_id, |tx| {
        tx.execute(
            "INSERT INTO teacher_surveys(id, class_list_id, teacher_id, preferred_json,
               challenging_json, submitted, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(class_list_id, teacher_id) DO UPDATE SET
               preferred_json = excluded.preferred_json,
               challenging_json = excluded.challenging_json,
               submitted = excluded.submitted,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &class_list_id,
                &teacher_id,
                &preferred_json,
                &challenging_json,
                submitted as i64,
                store::now_rfc3339(),
            ),
        )
        .map_err(|e| {
            err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "teacher_surveys" })),
            )
        })
    });
    if let Err(e) = written {
        return e;
    }

    ok(
        &req.id,
        json!({
            "teacherId": teacher_id,
            "preferredStudents": preferred,
            "challengingStudents": challenging,
            "submitted": submitted,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "surveys.upsert" => Some(handle_surveys_upsert(state, req)),
        _ => None,
    }
}
