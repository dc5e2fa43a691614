use crate::ipc::error::{err, ok, placement_err};
use crate::ipc::helpers::{
    optional_str, require_db, required_class_list, required_str, required_tag, roster_edit,
};
use crate::ipc::types::{AppState, Request};
use crate::placement::model::{RequestKind, RequestStatus, Tag};
use crate::store;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_requests_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_class_list(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let kind: RequestKind = match required_tag(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::student_in_class_list(conn, &class_list_id, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return placement_err(&req.id, &e),
    }

    let (target_teacher_id, target_student_id) = match kind {
        RequestKind::Teacher => {
            let Some(t) = optional_str(req, "targetTeacherId") else {
                return err(&req.id, "bad_params", "missing targetTeacherId", None);
            };
            match store::teacher_in_class_list(conn, &class_list_id, &t) {
                Ok(true) => {}
                Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
                Err(e) => return placement_err(&req.id, &e),
            }
            (Some(t), None)
        }
        RequestKind::Classmate => {
            let Some(s) = optional_str(req, "targetStudentId") else {
                return err(&req.id, "bad_params", "missing targetStudentId", None);
            };
            if s == student_id {
                return err(
                    &req.id,
                    "bad_params",
                    "a student cannot request themselves",
                    None,
                );
            }
            match store::student_in_class_list(conn, &class_list_id, &s) {
                Ok(true) => {}
                Ok(false) => return err(&req.id, "not_found", "target student not found", None),
                Err(e) => return placement_err(&req.id, &e),
            }
            (None, Some(s))
        }
    };

    let request_id = Uuid::new_v4().to_string();
    let written = roster_edit(conn, req, &class_list_id, |tx| {
        tx.execute(
            "INSERT INTO parent_requests(id, class_list_id, student_id, kind, target_teacher_id,
               target_student_id, status, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &request_id,
                &class_list_id,
                &student_id,
                kind.as_str(),
                &target_teacher_id,
                &target_student_id,
                RequestStatus::Pending.as_str(),
                store::now_rfc3339(),
            ),
        )
        .map_err(|e| {
            err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "parent_requests" })),
            )
        })
    });
    if let Err(e) = written {
        return e;
    }

    ok(
        &req.id,
        json!({
            "requestId": request_id,
            "status": RequestStatus::Pending.as_str(),
        }),
    )
}

fn handle_requests_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let request_id = match required_str(req, "requestId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status: RequestStatus = match required_tag(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let class_list_id: Option<String> = match conn
        .query_row(
            "SELECT class_list_id FROM parent_requests WHERE id = ?",
            [&request_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(class_list_id) = class_list_id else {
        return err(&req.id, "not_found", "request not found", None);
    };

    let written = roster_edit(conn, req, &class_list_id, |tx| {
        tx.execute(
            "UPDATE parent_requests SET status = ? WHERE id = ?",
            (status.as_str(), &request_id),
        )
        .map_err(|e| err(&req.id, "db_update_failed", e.to_string(), None))
    });
    if let Err(e) = written {
        return e;
    }

    ok(
        &req.id,
        json!({ "requestId": request_id, "status": status.as_str() }),
    )
}

fn handle_requests_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_class_list(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status: Option<RequestStatus> = match optional_str(req, "status") {
        None => None,
        Some(_) => match required_tag(req, "status") {
            Ok(v) => Some(v),
            Err(e) => return e,
        },
    };

    let mut stmt = match conn.prepare(
        "SELECT id, student_id, kind, target_teacher_id, target_student_id, status, created_at
         FROM parent_requests
         WHERE class_list_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at, rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&class_list_id, status.map(|s| s.as_str())), |r| {
            let id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let kind: String = r.get(2)?;
            let target_teacher_id: Option<String> = r.get(3)?;
            let target_student_id: Option<String> = r.get(4)?;
            let status: String = r.get(5)?;
            let created_at: String = r.get(6)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "kind": kind,
                "targetTeacherId": target_teacher_id,
                "targetStudentId": target_student_id,
                "status": status,
                "createdAt": created_at,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(requests) => ok(&req.id, json!({ "requests": requests })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "requests.create" => Some(handle_requests_create(state, req)),
        "requests.setStatus" => Some(handle_requests_set_status(state, req)),
        "requests.list" => Some(handle_requests_list(state, req)),
        _ => None,
    }
}
