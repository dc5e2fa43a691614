use crate::ipc::error::{err, ok, placement_err};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::placement::model::{parse_factor_list, parse_strategy};
use crate::placement::{self, EngineOptions, PlacementError};
use crate::store;
use serde_json::json;
use tracing::info;

fn handle_optimize(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_list_id = match required_str(req, "classListId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let dry_run = req
        .params
        .get("dryRun")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let class_list = match store::load_class_list(conn, &class_list_id) {
        Ok(l) => l,
        Err(e) => return placement_err(&req.id, &e),
    };

    // Per-run overrides fall back to what the class list was created with.
    let factors = match req.params.get("factors") {
        Some(v) if !v.is_null() => match parse_factor_list(v) {
            Ok(f) => f,
            Err(e) => return placement_err(&req.id, &e),
        },
        _ => class_list.factors.clone(),
    };
    let strategy = match req.params.get("strategy") {
        Some(v) if !v.is_null() => match v.as_str() {
            Some(raw) => match parse_strategy(raw) {
                Ok(s) => s,
                Err(e) => return placement_err(&req.id, &e),
            },
            None => {
                let e = PlacementError::invalid("strategy must be a string");
                return placement_err(&req.id, &e);
            }
        },
        _ => class_list.strategy,
    };

    let surveys = match store::find_surveys_for_class_list(conn, &class_list_id) {
        Ok(v) => v,
        Err(e) => return placement_err(&req.id, &e),
    };
    let requests = match store::find_approved_requests(conn, &class_list_id) {
        Ok(v) => v,
        Err(e) => return placement_err(&req.id, &e),
    };

    let options = EngineOptions {
        default_capacity: state.config.default_capacity,
    };
    let optimization = match placement::optimize(
        &class_list,
        &surveys,
        &requests,
        &factors,
        strategy,
        &options,
    ) {
        Ok(o) => o,
        Err(e) => return placement_err(&req.id, &e),
    };

    let (optimization, version, committed) = if dry_run {
        (optimization, class_list.version, false)
    } else {
        match store::upsert_classes(conn, &class_list_id, class_list.version, &optimization.buckets) {
            Ok(outcome) => {
                info!(
                    class_list = %class_list_id,
                    version = outcome.version,
                    classes = outcome.class_ids.len(),
                    "placement committed"
                );
                let version = outcome.version;
                (optimization.with_class_ids(&outcome.class_ids), version, true)
            }
            Err(e) => return placement_err(&req.id, &e),
        }
    };

    let mut result = match serde_json::to_value(&optimization.result) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "serialize_failed", e.to_string(), None),
    };
    result["version"] = json!(version);
    result["committed"] = json!(committed);
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classLists.optimize" => Some(handle_optimize(state, req)),
        _ => None,
    }
}
