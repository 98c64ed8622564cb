// mod.rs — Subcommand implementations and the pieces they share.

pub mod entitlement;
pub mod evaluate;
pub mod operator;
pub mod serve;
pub mod snapshot;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use bane_audit::BaneStore;
use bane_entitlements::{SnapshotError, VerifiedSnapshot};
use bane_gateway::BaneConfig;
use bane_policy::BaneEngine;

/// An engine wired to the configured store.
pub(crate) fn build_engine(config: &BaneConfig) -> anyhow::Result<(Arc<BaneEngine>, Arc<dyn BaneStore>)> {
    let store = config.build_store().context("failed to open the BANE store")?;
    let engine = config
        .build_engine(config.build_sink(store.clone()))
        .context("failed to build the enforcement engine")?;
    Ok((Arc::new(engine), store))
}

/// Wait for queued audit writes before the process exits.
pub(crate) fn drain_audit_sink(engine: &BaneEngine) {
    if !engine.sink().flush() {
        tracing::warn!(dropped = engine.sink().dropped(), "audit records still pending at exit");
    }
}

/// Read a snapshot file and verify it against the keys configured for the
/// org it names.
pub(crate) fn verify_snapshot_file(config: &BaneConfig, path: &Path) -> anyhow::Result<VerifiedSnapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not JSON", path.display()))?;
    let org_id = document
        .get("orgId")
        .and_then(serde_json::Value::as_str)
        .ok_or(SnapshotError::MissingField("orgId"))?
        .to_string();
    let keyring = config.keyring_for(&org_id)?;
    let verified = keyring
        .verify_value(document)
        .with_context(|| format!("snapshot {} failed verification", path.display()))?;
    Ok(verified)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
