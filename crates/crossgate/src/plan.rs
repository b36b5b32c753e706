//! Run plan construction.
//!
//! One login/logout event becomes one persisted run: an ordered list of
//! per-target signed step tokens under a random run id. The home domain and
//! empty or duplicate hosts never get a step; an empty target set produces
//! no run at all.

use anyhow::Result;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::collections::HashSet;
use std::sync::Arc;

use crossgate_common::constants::RUN_ID_BYTES;
use crossgate_common::{RunPlan, RunStep, SsoMode, canonical_host};

use crate::runs::RunStore;
use crate::token::TokenCodec;

pub struct RunPlanner {
    codec: Arc<TokenCodec>,
    token_ttl_secs: u64,
    run_ttl_secs: u64,
}

impl RunPlanner {
    pub fn new(codec: Arc<TokenCodec>, token_ttl_secs: u64, run_ttl_secs: u64) -> Self {
        Self {
            codec,
            token_ttl_secs,
            run_ttl_secs,
        }
    }

    /// Build and persist a login run propagating `sid` to every target
    /// domain. Returns `None` when no targets remain after canonicalization.
    pub async fn plan_login(
        &self,
        store: &dyn RunStore,
        home: &str,
        targets: &[String],
        sid: &str,
    ) -> Result<Option<(String, RunPlan)>> {
        self.plan(store, SsoMode::Login, home, targets, Some(sid)).await
    }

    /// Build and persist a logout run. Logout tokens carry no session id -
    /// they convey the absence of one.
    pub async fn plan_logout(
        &self,
        store: &dyn RunStore,
        home: &str,
        targets: &[String],
    ) -> Result<Option<(String, RunPlan)>> {
        self.plan(store, SsoMode::Logout, home, targets, None).await
    }

    async fn plan(
        &self,
        store: &dyn RunStore,
        mode: SsoMode,
        home: &str,
        targets: &[String],
        sid: Option<&str>,
    ) -> Result<Option<(String, RunPlan)>> {
        let home = canonical_host(home);

        let mut seen = HashSet::new();
        let hosts: Vec<String> = targets
            .iter()
            .map(|t| canonical_host(t))
            .filter(|h| !h.is_empty() && *h != home)
            .filter(|h| seen.insert(h.clone()))
            .collect();

        if hosts.is_empty() {
            return Ok(None);
        }

        let mut steps = Vec::with_capacity(hosts.len());
        for host in &hosts {
            let code = self
                .codec
                .make(mode, sid, host, self.token_ttl_secs as i64)?;
            steps.push(RunStep {
                host: host.clone(),
                code,
            });
        }

        let run_id = new_run_id();
        let plan = RunPlan { home, steps };
        store.put(&run_id, &plan, self.run_ttl_secs).await?;

        tracing::info!(
            mode = mode.as_str(),
            run_id = %run_id,
            home = %plan.home,
            targets = ?hosts,
            "Planned synchronization run"
        );

        Ok(Some((run_id, plan)))
    }
}

/// Cryptographically random URL-safe run identifier.
pub fn new_run_id() -> String {
    use rand::Rng;

    let mut bytes = [0u8; RUN_ID_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runs::MemoryRunStore;

    fn planner() -> RunPlanner {
        let codec = Arc::new(TokenCodec::new(
            b"0123456789abcdef0123456789abcdef".to_vec(),
        ));
        RunPlanner::new(codec, 180, 300)
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(b"0123456789abcdef0123456789abcdef".to_vec())
    }

    #[tokio::test]
    async fn targets_are_canonicalized_and_deduplicated() {
        let store = MemoryRunStore::new();
        let targets = vec![
            "a.com".to_string(),
            "B.com".to_string(),
            "b.com".to_string(),
            String::new(),
        ];

        let (run_id, plan) = planner()
            .plan_login(&store, "a.com", &targets, "S")
            .await
            .unwrap()
            .expect("one target survives");

        assert_eq!(plan.home, "a.com");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].host, "b.com");

        let claims = codec().parse(&plan.steps[0].code).expect("valid token");
        assert_eq!(claims.mode, SsoMode::Login);
        assert_eq!(claims.sid.as_deref(), Some("S"));
        assert_eq!(claims.host, "b.com");

        // The run was persisted under the returned id
        assert!(store.get(&run_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn logout_steps_carry_no_sid() {
        let store = MemoryRunStore::new();
        let targets = vec!["b.com".to_string()];

        let (_, plan) = planner()
            .plan_logout(&store, "a.com", &targets)
            .await
            .unwrap()
            .unwrap();

        let claims = codec().parse(&plan.steps[0].code).unwrap();
        assert_eq!(claims.mode, SsoMode::Logout);
        assert!(claims.sid.is_none());
    }

    #[tokio::test]
    async fn empty_target_set_produces_no_run() {
        let store = MemoryRunStore::new();
        let targets = vec!["a.com".to_string(), "https://A.com/".to_string()];

        let result = planner()
            .plan_login(&store, "a.com", &targets, "S")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn step_order_follows_target_enumeration_order() {
        let store = MemoryRunStore::new();
        let targets = vec!["c.com".to_string(), "b.com".to_string()];

        let (_, plan) = planner()
            .plan_login(&store, "a.com", &targets, "S")
            .await
            .unwrap()
            .unwrap();

        let hosts: Vec<&str> = plan.steps.iter().map(|s| s.host.as_str()).collect();
        assert_eq!(hosts, ["c.com", "b.com"]);
    }

    #[test]
    fn run_ids_are_unique_and_url_safe() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let id = new_run_id();
            assert_eq!(id.len(), 16);
            assert!(
                id.bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
            );
            assert!(ids.insert(id), "run id collision");
        }
    }
}
