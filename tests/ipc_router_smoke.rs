mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, request_err, request_ok, spawn_sidecar, spawn_sidecar_with_env, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("classlist-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(health.get("defaultCapacity").and_then(|v| v.as_u64()), Some(30));

    // Nothing touches the store before a workspace is chosen.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "classLists.create",
        json!({ "name": "Grade 3" }),
    );
    assert_eq!(code, "no_workspace");
    let lists = request_ok(&mut stdin, &mut reader, "3", "classLists.list", json!({}));
    assert_eq!(lists["classLists"].as_array().map(|a| a.len()), Some(0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("classlist.sqlite3").exists());

    let families = [
        ("5", "classLists.open", json!({ "classListId": "missing" })),
        ("6", "classLists.delete", json!({ "classListId": "missing" })),
        ("7", "teachers.create", json!({ "classListId": "missing", "name": "T" })),
        ("8", "classes.create", json!({ "classListId": "missing", "name": "C" })),
        ("9", "surveys.upsert", json!({ "classListId": "missing", "teacherId": "t" })),
        ("10", "requests.list", json!({ "classListId": "missing" })),
        ("11", "classLists.optimize", json!({ "classListId": "missing" })),
    ];
    for (id, method, params) in families {
        let code = request_err(&mut stdin, &mut reader, id, method, params);
        assert_eq!(code, "not_found", "{method}");
    }

    let code = request_err(&mut stdin, &mut reader, "12", "nope.method", json!({}));
    assert_eq!(code, "not_implemented");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "13",
        "requests.setStatus",
        json!({ "requestId": "missing", "status": "approved" }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("bad_json"));

    let resp = request(&mut stdin, &mut reader, "after", "health", json!({}));
    assert_eq!(resp["ok"], json!(true));
}

#[test]
fn startup_config_comes_from_the_environment() {
    let workspace = temp_dir("classlist-env-config");
    let ws = workspace.to_string_lossy().to_string();
    let (_child, mut stdin, mut reader) = spawn_sidecar_with_env(&[
        ("CLASSLISTD_WORKSPACE", ws.as_str()),
        ("CLASSLISTD_DEFAULT_CAPACITY", "12"),
    ]);

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["workspacePath"], json!(ws));
    assert_eq!(health["defaultCapacity"], json!(12));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classLists.create",
        json!({ "name": "Env" }),
    );
    let class_list_id = created["classListId"].as_str().expect("id").to_string();
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "classListId": class_list_id, "name": "Room 1" }),
    );
    assert_eq!(class["capacity"], json!(12));
}
