// snapshot_roundtrip.rs — Issue, export, tamper, verify, evaluate offline.
//
// A snapshot leaves the issuer as JSON text and comes back the same way, so
// these tests work on the serialized form: any single-byte change to it must
// fail verification, and only a verified snapshot drives offline decisions.

use chrono::{DateTime, Duration, TimeZone, Utc};

use bane_entitlements::{
    evaluate_entitlement, DecisionReason, EntitlementRegistry, EntitlementRequest, IssueRequest,
    PolicyConstraints, RevokeRequest, SnapshotError, SnapshotKeyring, SnapshotSigner, Stage,
};

const SECRET: &[u8] = b"org-1-snapshot-secret";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
}

fn registry() -> EntitlementRegistry {
    let registry = EntitlementRegistry::new();
    registry.set_member("org-1", "owner", "owner");
    registry.set_member("org-1", "insp", "inspector");
    let mut vision = IssueRequest::new("org-1", "insp", "vision");
    vision.stage = Some(Stage::B);
    registry.issue("owner", &vision, now()).unwrap();
    let mut lidar = IssueRequest::new("org-1", "insp", "lidar");
    lidar.device_bound = true;
    lidar.allowed_device_ids = vec!["tablet-7".into()];
    registry.issue("owner", &lidar, now()).unwrap();
    registry
}

fn keyring() -> SnapshotKeyring {
    let mut ring = SnapshotKeyring::new();
    ring.insert("org-1", "k-2026", SECRET).unwrap();
    ring
}

fn exported() -> String {
    let signer = SnapshotSigner::new("k-2026", SECRET).unwrap();
    let snapshot = registry()
        .issue_snapshot("org-1", "insp", &signer, now())
        .unwrap();
    serde_json::to_string(&snapshot).unwrap()
}

#[test]
fn exported_snapshot_verifies() {
    let verified = keyring().verify_str(&exported()).unwrap();
    let body = verified.body();
    assert_eq!(body.uid, "insp");
    assert_eq!(body.org_id, "org-1");
    assert_eq!(body.entitlements.len(), 2);
    assert_eq!(body.constraints, PolicyConstraints::default());
}

#[test]
fn every_single_byte_mutation_is_rejected() {
    let json = exported();
    let ring = keyring();
    let bytes = json.as_bytes();
    let mut checked = 0;
    for i in 0..bytes.len() {
        let mut mutated = bytes.to_vec();
        mutated[i] = if bytes[i] == b'0' { b'1' } else { b'0' };
        let Ok(text) = String::from_utf8(mutated) else {
            continue;
        };
        assert!(
            ring.verify_str(&text).is_err(),
            "mutation at byte {} ({:?}) still verified",
            i,
            bytes[i] as char
        );
        checked += 1;
    }
    assert!(checked > 100);
}

#[test]
fn snapshot_from_another_org_key_is_rejected() {
    let signer = SnapshotSigner::new("k-2026", b"someone-else").unwrap();
    let snapshot = registry()
        .issue_snapshot("org-1", "insp", &signer, now())
        .unwrap();
    assert!(matches!(
        keyring().verify(&snapshot),
        Err(SnapshotError::BadSignature)
    ));

    let mut other = SnapshotKeyring::new();
    other.insert("org-2", "k-2026", SECRET).unwrap();
    assert!(matches!(
        other.verify_str(&exported()),
        Err(SnapshotError::UnknownKey { .. })
    ));
}

#[test]
fn offline_flow_from_exported_text() {
    let verified = keyring().verify_str(&exported()).unwrap();
    let t = now() + Duration::hours(1);

    let vision = EntitlementRequest::new("insp", "org-1", "vision")
        .offline()
        .with_stage(Stage::B);
    let d = evaluate_entitlement(&vision, Some(&verified), None, t);
    assert!(d.allow);
    assert_eq!(d.policy_version, Some(1));

    let external = vision.clone().requiring_external_hardware();
    assert_eq!(
        evaluate_entitlement(&external, Some(&verified), None, t).reason,
        DecisionReason::OfflineDenyExternal
    );

    let lidar = EntitlementRequest::new("insp", "org-1", "lidar").offline();
    assert_eq!(
        evaluate_entitlement(&lidar, Some(&verified), None, t).reason,
        DecisionReason::DeviceNotAllowed
    );
    let on_tablet = lidar.with_device("tablet-7");
    assert!(evaluate_entitlement(&on_tablet, Some(&verified), None, t).allow);

    let unknown = EntitlementRequest::new("insp", "org-1", "thermal").offline();
    assert_eq!(
        evaluate_entitlement(&unknown, Some(&verified), None, t).reason,
        DecisionReason::NoEntitlement
    );

    let late = now() + Duration::hours(6);
    assert_eq!(
        evaluate_entitlement(&vision, Some(&verified), None, late).reason,
        DecisionReason::OfflinePolicyExpired
    );
}

#[test]
fn revocation_reaches_the_next_snapshot() {
    let registry = registry();
    registry
        .revoke(
            "owner",
            &RevokeRequest {
                org_id: "org-1".into(),
                target_uid: "insp".into(),
                key: "vision".into(),
                reason: Some("contract ended".into()),
            },
            now(),
        )
        .unwrap();

    let signer = SnapshotSigner::new("k-2026", SECRET).unwrap();
    let snapshot = registry
        .issue_snapshot("org-1", "insp", &signer, now())
        .unwrap();
    assert_eq!(snapshot.body.policy_version, 2);
    let verified = keyring().verify(&snapshot).unwrap();

    let req = EntitlementRequest::new("insp", "org-1", "vision").offline();
    let d = evaluate_entitlement(&req, Some(&verified), None, now());
    assert_eq!(d.reason, DecisionReason::Revoked);
    assert_eq!(d.policy_version, Some(2));

    // Online, the registry's own record gives the same answer.
    let direct = registry.get("org-1", "insp", "vision").unwrap();
    let online = EntitlementRequest::new("insp", "org-1", "vision");
    assert_eq!(
        evaluate_entitlement(&online, None, Some(&direct), now()).reason,
        DecisionReason::Revoked
    );
}
