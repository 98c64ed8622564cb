// evaluate.rs — Evaluate one request from flags or a JSON file.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use bane_gateway::BaneConfig;
use bane_policy::{AuthContext, EvaluationInput, SessionIntegrity};

use super::{build_engine, drain_audit_sink, print_json};

#[derive(Args)]
pub struct EvaluateArgs {
    /// Request text to evaluate.
    #[arg(long, conflicts_with = "input")]
    text: Option<String>,

    /// JSON file holding a full EvaluationInput (`-` for stdin).
    #[arg(long)]
    input: Option<PathBuf>,

    /// Route the request is addressed to.
    #[arg(long, default_value = "/cli")]
    route: String,

    /// Authenticated identity. Omit to evaluate an anonymous request.
    #[arg(long)]
    identity: Option<String>,

    /// Capabilities held by the identity (repeatable).
    #[arg(long = "cap")]
    caps: Vec<String>,

    /// Capability the request requires.
    #[arg(long)]
    require: Option<String>,

    /// Replay nonce.
    #[arg(long)]
    nonce: Option<String>,

    /// Mark the session as not attested upstream.
    #[arg(long)]
    unattested: bool,
}

impl EvaluateArgs {
    fn to_input(&self) -> anyhow::Result<EvaluationInput> {
        if let Some(path) = &self.input {
            let text = if path.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?
            } else {
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?
            };
            return serde_json::from_str(&text).context("input is not a valid EvaluationInput");
        }

        let mut input = EvaluationInput::new(self.text.clone().unwrap_or_default(), self.route.clone());
        if let Some(cap) = &self.require {
            input = input.with_capability(cap.clone());
        }
        if let Some(identity) = &self.identity {
            let integrity = if self.unattested {
                SessionIntegrity::default()
            } else {
                SessionIntegrity::verified()
            };
            let mut auth = AuthContext::new(identity)
                .with_capabilities(self.caps.iter().cloned())
                .with_integrity(integrity);
            if let Some(nonce) = &self.nonce {
                auth = auth.with_nonce(nonce.clone());
            }
            input = input.with_auth(auth);
        }
        Ok(input)
    }
}

pub fn execute(args: &EvaluateArgs, config: &BaneConfig) -> anyhow::Result<()> {
    let input = args.to_input()?;
    let (engine, _store) = build_engine(config)?;
    let output = engine.evaluate(&input);
    drain_audit_sink(&engine);
    print_json(&output)
}
