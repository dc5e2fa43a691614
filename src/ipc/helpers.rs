use rusqlite::Connection;

use super::error::{err, placement_err};
use super::types::{AppState, Request};
use crate::placement::model::Tag;
use crate::store;

/// Error envelope already built for the caller to return as-is.
pub type Reply = serde_json::Value;

pub fn require_db<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Reply> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Trimmed, non-empty string parameter.
pub fn required_str(req: &Request, key: &str) -> Result<String, Reply> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{key} must not be empty"),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {key}"), None)),
    }
}

/// `classListId` parameter, checked against the store.
pub fn required_class_list(conn: &Connection, req: &Request) -> Result<String, Reply> {
    let class_list_id = required_str(req, "classListId")?;
    match store::class_list_exists(conn, &class_list_id) {
        Ok(true) => Ok(class_list_id),
        Ok(false) => Err(err(&req.id, "not_found", "class list not found", None)),
        Err(e) => Err(placement_err(&req.id, &e)),
    }
}

/// Runs a roster edit and the class list's version bump in one
/// transaction, so an edit never lands without moving the version.
pub fn roster_edit<T>(
    conn: &Connection,
    req: &Request,
    class_list_id: &str,
    edit: impl FnOnce(&Connection) -> Result<T, Reply>,
) -> Result<T, Reply> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| err(&req.id, "db_tx_failed", e.to_string(), None))?;

    let out = match edit(&tx) {
        Ok(v) => v,
        Err(reply) => {
            let _ = tx.rollback();
            return Err(reply);
        }
    };
    if let Err(e) = store::touch_class_list(&tx, class_list_id) {
        let _ = tx.rollback();
        return Err(placement_err(&req.id, &e));
    }

    tx.commit()
        .map_err(|e| err(&req.id, "db_commit_failed", e.to_string(), None))?;
    Ok(out)
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_tag<T: Tag>(req: &Request, key: &str) -> Result<T, Reply> {
    let raw = required_str(req, key)?;
    T::parse(&raw).ok_or_else(|| {
        let allowed: Vec<&str> = T::ALL.iter().map(|v| v.as_str()).collect();
        err(
            &req.id,
            "bad_params",
            format!("invalid {key}: {raw}"),
            Some(serde_json::json!({ "allowed": allowed })),
        )
    })
}

pub fn string_list(req: &Request, key: &str) -> Result<Vec<String>, Reply> {
    let Some(v) = req.params.get(key) else {
        return Ok(Vec::new());
    };
    if v.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = v.as_array() else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{key} must be an array of strings"),
            None,
        ));
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{key} must be an array of strings"),
                    None,
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        ensure_schema(&conn).expect("schema");
        conn.execute(
            "INSERT INTO class_lists(id, name, factors_json, strategy, version, created_at)
             VALUES('cl', 'Grade 1', '[]', 'balanced', 5, 'now')",
            [],
        )
        .expect("class list");
        conn
    }

    fn request() -> Request {
        Request {
            id: "1".into(),
            method: "teachers.create".into(),
            params: json!({}),
        }
    }

    fn insert_teacher(conn: &Connection) -> Result<(), Reply> {
        conn.execute(
            "INSERT INTO teachers(id, class_list_id, name, sort_order) VALUES('t1', 'cl', 'T', 0)",
            [],
        )
        .map(|_| ())
        .map_err(|e| err("1", "db_insert_failed", e.to_string(), None))
    }

    fn counts(conn: &Connection) -> (i64, i64) {
        let teachers = conn
            .query_row("SELECT COUNT(*) FROM teachers", [], |r| r.get(0))
            .expect("teachers");
        let version = conn
            .query_row("SELECT version FROM class_lists WHERE id = 'cl'", [], |r| r.get(0))
            .expect("version");
        (teachers, version)
    }

    #[test]
    fn roster_edit_commits_edit_and_version_together() {
        let conn = setup();
        roster_edit(&conn, &request(), "cl", insert_teacher).expect("edit");
        assert_eq!(counts(&conn), (1, 6));
    }

    #[test]
    fn failed_version_bump_discards_the_edit() {
        let conn = setup();
        conn.execute_batch(
            "CREATE TRIGGER freeze_version BEFORE UPDATE OF version ON class_lists
             BEGIN SELECT RAISE(ABORT, 'version frozen'); END;",
        )
        .expect("trigger");

        let reply = roster_edit(&conn, &request(), "cl", insert_teacher).unwrap_err();
        assert_eq!(reply["ok"], json!(false));
        assert_eq!(counts(&conn), (0, 5));
    }

    #[test]
    fn failed_edit_leaves_version_alone() {
        let conn = setup();
        let reply = roster_edit(&conn, &request(), "cl", |_| -> Result<(), Reply> {
            Err(err("1", "bad_params", "nope", None))
        })
        .unwrap_err();
        assert_eq!(reply["error"]["code"], json!("bad_params"));
        assert_eq!(counts(&conn), (0, 5));
    }
}
