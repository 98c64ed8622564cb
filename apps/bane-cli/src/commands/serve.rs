// serve.rs — JSON-lines evaluation loop over stdio.
//
// Each stdin line is either an EvaluationInput or an operator envelope
// (`{"operator": {...}, "auth": {...}}`). Each produces exactly one stdout
// line. A line that does not parse gets an error object, never a decision.

use std::io::{BufRead, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use bane_gateway::{BaneConfig, OperatorConsole};
use bane_policy::{AuthContext, BaneEngine, EvaluationInput};

use super::{build_engine, drain_audit_sink};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "action")]
enum OperatorAction {
    #[serde(rename = "lock", rename_all = "camelCase")]
    Lock { identity_id: String, ttl_seconds: i64 },
    #[serde(rename = "unlock", rename_all = "camelCase")]
    Unlock { identity_id: String },
    #[serde(rename = "audits")]
    Audits {
        #[serde(default = "default_limit")]
        limit: usize,
    },
    #[serde(rename = "incidents")]
    Incidents {
        #[serde(default = "default_limit")]
        limit: usize,
    },
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServeLine {
    Operator {
        operator: OperatorAction,
        #[serde(default)]
        auth: AuthContext,
    },
    Evaluate(EvaluationInput),
}

#[derive(Serialize)]
struct LineError<'a> {
    error: &'a str,
    line: usize,
}

struct Session {
    engine: Arc<BaneEngine>,
    console: OperatorConsole,
}

impl Session {
    fn new(config: &BaneConfig) -> anyhow::Result<Self> {
        let (engine, _store) = build_engine(config)?;
        let console = OperatorConsole::new(engine.clone()).with_capability(config.operator_capability.clone());
        Ok(Self { engine, console })
    }

    /// One response line for one request line.
    fn handle(&self, line_no: usize, line: &str) -> anyhow::Result<String> {
        let parsed: ServeLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(line = line_no, "unparseable request line: {}", e);
                return Ok(serde_json::to_string(&LineError {
                    error: "invalid request",
                    line: line_no,
                })?);
            }
        };
        let response = match parsed {
            ServeLine::Evaluate(input) => serde_json::to_value(self.engine.evaluate(&input))?,
            ServeLine::Operator { operator, auth } => self.operate(operator, &auth),
        };
        Ok(serde_json::to_string(&response)?)
    }

    fn operate(&self, action: OperatorAction, auth: &AuthContext) -> serde_json::Value {
        let result = match action {
            OperatorAction::Lock {
                identity_id,
                ttl_seconds,
            } => self
                .console
                .force_lock_secs(auth, &identity_id, ttl_seconds)
                .map(|until| json!({ "ok": true, "lockedUntil": until })),
            OperatorAction::Unlock { identity_id } => self
                .console
                .force_unlock(auth, &identity_id)
                .map(|had_state| json!({ "ok": true, "hadState": had_state })),
            OperatorAction::Audits { limit } => self
                .console
                .recent_audits(auth, limit)
                .map(|audits| json!({ "ok": true, "audits": audits })),
            OperatorAction::Incidents { limit } => self
                .console
                .recent_incidents(auth, limit)
                .map(|incidents| json!({ "ok": true, "incidents": incidents })),
        };
        result.unwrap_or_else(|e| json!({ "ok": false, "error": e.to_string() }))
    }
}

pub fn execute(config: &BaneConfig) -> anyhow::Result<()> {
    let session = Session::new(config)?;
    tracing::info!(profile = %session.engine.profile_id(), "serving on stdio");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    for (idx, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = session.handle(idx + 1, &line)?;
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }
    tracing::info!("stdin closed, shutting down");
    drain_audit_sink(&session.engine);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(&BaneConfig::default()).unwrap()
    }

    fn respond(session: &Session, line: &str) -> serde_json::Value {
        serde_json::from_str(&session.handle(1, line).unwrap()).unwrap()
    }

    #[test]
    fn evaluates_input_lines() {
        let s = session();
        let out = respond(
            &s,
            r#"{"text":"hello","req":{"route":"/x","auth":{"identityId":"u1","authenticated":true,
                "capabilities":["bane:invoke"],
                "sessionIntegrity":{"nonceOk":true,"signatureOk":true,"tokenFresh":true}}}}"#,
        );
        assert_eq!(out["verdict"], "allow");
        assert!(out["traceId"].is_string());
    }

    #[test]
    fn unauthenticated_flag_missing_is_denied() {
        let s = session();
        let out = respond(&s, r#"{"text":"hello","req":{"route":"/x","auth":{"identityId":"u1"}}}"#);
        assert_eq!(out["verdict"], "deny");
    }

    #[test]
    fn garbage_gets_an_error_object() {
        let s = session();
        let out = respond(&s, "{not json");
        assert_eq!(out["error"], "invalid request");
        assert!(out.get("verdict").is_none());
    }

    #[test]
    fn operator_envelope_requires_the_capability() {
        let s = session();
        let refused = respond(
            &s,
            r#"{"operator":{"action":"lock","identityId":"u2","ttlSeconds":60},
                "auth":{"identityId":"u1","authenticated":true}}"#,
        );
        assert_eq!(refused["ok"], false);

        let locked = respond(
            &s,
            r#"{"operator":{"action":"lock","identityId":"u2","ttlSeconds":60},
                "auth":{"identityId":"ops","authenticated":true,"capabilities":["bane:operator"]}}"#,
        );
        assert_eq!(locked["ok"], true);
        assert!(s.engine.ledger().is_locked("u2", s.engine.now()));
    }

    #[test]
    fn out_of_range_lock_ttl_is_answered_not_fatal() {
        let s = session();
        let refused = respond(
            &s,
            r#"{"operator":{"action":"lock","identityId":"u2","ttlSeconds":9223372036854775807}}"#,
        );
        assert_eq!(refused["ok"], false);
        assert!(!s.engine.ledger().is_locked("u2", s.engine.now()));

        let clamped = respond(
            &s,
            r#"{"operator":{"action":"lock","identityId":"u2","ttlSeconds":9223372036854775807},
                "auth":{"identityId":"ops","authenticated":true,"capabilities":["bane:operator"]}}"#,
        );
        assert_eq!(clamped["ok"], true);
        let until: chrono::DateTime<chrono::Utc> =
            serde_json::from_value(clamped["lockedUntil"].clone()).unwrap();
        assert!(until <= s.engine.now() + chrono::Duration::hours(24));

        let negative = respond(
            &s,
            r#"{"operator":{"action":"lock","identityId":"u3","ttlSeconds":-9223372036854775808},
                "auth":{"identityId":"ops","authenticated":true,"capabilities":["bane:operator"]}}"#,
        );
        assert_eq!(negative["ok"], true);
    }
}
