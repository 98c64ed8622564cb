// gateway_flow.rs — Config file to guarded traffic, end to end.
//
// Builds everything from a `.bane/config.toml` in a temp project: JSONL
// store, signed requests, operator lock, and snapshot keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::{tempdir, TempDir};

use bane_audit::{BaneStore, JsonlStore};
use bane_entitlements::{EntitlementRegistry, IssueRequest};
use bane_gateway::{
    caps_for_role, BaneConfig, HttpGuard, HttpRequest, OperatorConsole, StoreKind,
};
use bane_policy::{AuthContext, HmacRequestVerifier};

const CONFIG: &str = r#"
request_signing_secret = "edge-secret"

[store]
kind = "jsonl"
dir = "STORE_DIR"

[[snapshot_keys]]
org_id = "org-1"
kid = "k1"
secret = "snap-secret"
"#;

fn project() -> (TempDir, BaneConfig) {
    let dir = tempdir().unwrap();
    let store_dir = dir.path().join(".bane").join("store");
    std::fs::create_dir_all(dir.path().join(".bane")).unwrap();
    std::fs::write(
        BaneConfig::config_path(dir.path()),
        CONFIG.replace("STORE_DIR", &store_dir.to_string_lossy()),
    )
    .unwrap();
    let config = BaneConfig::load_for_project(dir.path()).unwrap();
    (dir, config)
}

fn signed(identity: &str, nonce: &str, body: &str) -> HttpRequest {
    let sig = HmacRequestVerifier::new(b"edge-secret")
        .unwrap()
        .sign(identity, Some(nonce), body);
    HttpRequest {
        path: "/api/scing/chat".into(),
        headers: BTreeMap::from([
            ("x-bane-nonce".to_string(), nonce.to_string()),
            ("x-bane-signature".to_string(), sig),
        ]),
        body_text: body.into(),
        identity_id: Some(identity.into()),
        capabilities: caps_for_role(Some("inspector")).into_iter().map(String::from).collect(),
        ..HttpRequest::default()
    }
}

#[test]
fn configured_gateway_enforces_signatures_and_persists() {
    let (_dir, config) = project();
    assert_eq!(config.store.kind, StoreKind::Jsonl);

    let store = config.build_store().unwrap();
    let engine = Arc::new(config.build_engine(config.build_sink(store.clone())).unwrap());
    let guard = HttpGuard::new(engine.clone()).with_required_capability("bane:invoke");

    let ok = guard.check(&signed("u1", "n-1", "list today's inspections")).0;
    assert_eq!(ok.status, 200);

    let mut forged = signed("u1", "n-2", "list today's inspections");
    forged.body_text = "list every inspection".into();
    let (denied, output) = guard.check(&forged);
    assert_eq!(denied.status, 403);
    assert_eq!(output.primary_finding(), Some("SESSION_INTEGRITY_FAILED"));

    // Writes go through the background sink; drain it, then a fresh handle
    // on the same directory sees both decisions.
    assert!(config.store.background);
    assert!(engine.sink().flush());
    let reopened = JsonlStore::open(&config.store.dir).unwrap();
    let audits = reopened.recent_audits(10).unwrap();
    assert_eq!(audits.len(), 2);
    assert_eq!(audits[0].trace_id, denied.trace_id);
    assert!(audits.iter().all(|a| a.input_hash.is_some()));
}

#[test]
fn operator_lock_shows_up_as_423() {
    let (_dir, config) = project();
    let store = config.build_store().unwrap();
    let engine = Arc::new(config.build_engine(config.build_sink(store)).unwrap());
    let guard = HttpGuard::new(engine.clone());
    let console = OperatorConsole::new(engine.clone()).with_capability(config.operator_capability.clone());

    let ops = AuthContext::new("ops").with_capabilities([config.operator_capability.as_str()]);
    let until = console.force_lock(&ops, "u7", Duration::minutes(10)).unwrap();
    assert!(until > Utc::now());

    let locked = guard.check(&signed("u7", "n-1", "hello")).0;
    assert_eq!(locked.status, 423);
    assert!(locked.message.is_some());

    console.force_unlock(&ops, "u7").unwrap();
    assert_eq!(guard.check(&signed("u7", "n-2", "hello")).0.status, 200);
}

#[test]
fn configured_snapshot_keys_sign_and_verify() {
    let (_dir, config) = project();
    let registry = EntitlementRegistry::new();
    registry.set_member("org-1", "boss", "owner");
    registry.set_member("org-1", "u1", "inspector");
    registry
        .issue("boss", &IssueRequest::new("org-1", "u1", "vision"), Utc::now())
        .unwrap();
    registry.set_constraints("org-1", config.policy_constraints());

    let signer = config.signer_for("org-1").unwrap();
    let snapshot = registry
        .issue_snapshot("org-1", "u1", &signer, Utc::now())
        .unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();

    assert!(config.keyring_for("org-1").unwrap().verify_str(&json).is_ok());
    assert!(config.keyring_for("org-2").unwrap().verify_str(&json).is_err());
    assert!(config.signer_for("org-2").is_err());
}
