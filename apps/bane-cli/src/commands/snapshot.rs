// snapshot.rs — Snapshot subcommands: issue, verify.
//
// `issue` builds a one-off registry from flags: the subject's role and the
// grants to include, issued by a local administrator. The signed snapshot is
// written as JSON to stdout or a file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

use bane_entitlements::{EntitlementRegistry, IssueRequest, PolicySnapshot, Stage};
use bane_gateway::BaneConfig;

use super::{print_json, verify_snapshot_file};

const LOCAL_ISSUER: &str = "bane-cli";

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Issue and sign a snapshot for one identity.
    Issue {
        /// Org the snapshot is scoped to.
        #[arg(long)]
        org: String,
        /// Identity the snapshot is issued for.
        #[arg(long)]
        uid: String,
        /// The identity's role in the org.
        #[arg(long, default_value = "inspector")]
        role: String,
        /// Entitlement to include, as `key` or `key:stage` (repeatable).
        #[arg(long = "grant")]
        grants: Vec<String>,
        /// Lifetime of each included entitlement, in days.
        #[arg(long)]
        days: Option<i64>,
        /// Write the snapshot here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify a snapshot file against the configured keys.
    Verify {
        /// Snapshot JSON file.
        path: PathBuf,
    },
}

pub fn execute(cmd: &SnapshotCommands, config: &BaneConfig) -> anyhow::Result<()> {
    match cmd {
        SnapshotCommands::Issue {
            org,
            uid,
            role,
            grants,
            days,
            out,
        } => {
            let snapshot = issue(config, org, uid, role, grants, *days)?;
            match out {
                Some(path) => write_snapshot(path, &snapshot),
                None => print_json(&snapshot),
            }
        }
        SnapshotCommands::Verify { path } => {
            let verified = verify_snapshot_file(config, path)?;
            let body = verified.body();
            print_json(&json!({
                "ok": true,
                "uid": body.uid,
                "orgId": body.org_id,
                "policyVersion": body.policy_version,
                "effectiveExpiry": body.effective_expiry(),
                "entitlements": body.entitlements.keys().collect::<Vec<_>>(),
            }))
        }
    }
}

/// Split `key` or `key:stage`.
fn parse_grant(grant: &str) -> anyhow::Result<(String, Option<Stage>)> {
    match grant.split_once(':') {
        Some((key, stage)) => {
            let stage = stage.parse::<Stage>().map_err(anyhow::Error::msg)?;
            Ok((key.to_string(), Some(stage)))
        }
        None => Ok((grant.to_string(), None)),
    }
}

fn issue(
    config: &BaneConfig,
    org: &str,
    uid: &str,
    role: &str,
    grants: &[String],
    days: Option<i64>,
) -> anyhow::Result<PolicySnapshot> {
    let registry = EntitlementRegistry::new();
    registry.set_member(org, LOCAL_ISSUER, "admin");
    registry.set_member(org, uid, role);
    registry.set_constraints(org, config.policy_constraints());

    let now = Utc::now();
    for grant in grants {
        let (key, stage) = parse_grant(grant).with_context(|| format!("bad --grant '{}'", grant))?;
        let mut request = IssueRequest::new(org, uid, key);
        request.stage = stage;
        request.days = days;
        registry.issue(LOCAL_ISSUER, &request, now)?;
    }

    let signer = config.signer_for(org)?;
    Ok(registry.issue_snapshot(org, uid, &signer, now)?)
}

fn write_snapshot(path: &Path, snapshot: &PolicySnapshot) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "snapshot written");
    Ok(())
}
