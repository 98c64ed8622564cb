// entitlement.rs — Entitlement subcommands: check.

use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;

use bane_entitlements::{evaluate_entitlement, EntitlementRequest, Stage};
use bane_gateway::BaneConfig;

use super::{print_json, verify_snapshot_file};

#[derive(Subcommand)]
pub enum EntitlementCommands {
    /// Decide whether an identity may use a key, from a snapshot file.
    Check {
        /// Verified snapshot to decide from.
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        uid: String,
        #[arg(long)]
        org: String,
        /// Entitlement key.
        #[arg(long)]
        key: String,
        /// Minimum stage (A, B, or NA).
        #[arg(long)]
        stage: Option<Stage>,
        #[arg(long)]
        device: Option<String>,
        /// Decide as an online client (skips the offline constraints).
        #[arg(long)]
        online: bool,
        #[arg(long)]
        external_hardware: bool,
        #[arg(long)]
        physical_control: bool,
    },
}

pub fn execute(cmd: &EntitlementCommands, config: &BaneConfig) -> anyhow::Result<()> {
    match cmd {
        EntitlementCommands::Check {
            snapshot,
            uid,
            org,
            key,
            stage,
            device,
            online,
            external_hardware,
            physical_control,
        } => {
            let verified = verify_snapshot_file(config, snapshot)?;
            let request = EntitlementRequest {
                auth_uid: Some(uid.clone()),
                org_id: Some(org.clone()),
                key: key.clone(),
                required_stage: *stage,
                requires_external_hardware: *external_hardware,
                requires_physical_control: *physical_control,
                device_id: device.clone(),
                online: *online,
            };
            let decision = evaluate_entitlement(&request, Some(&verified), None, Utc::now());
            if !decision.allow {
                tracing::info!(reason = ?decision.reason, key = %key, "entitlement denied");
            }
            print_json(&decision)
        }
    }
}
