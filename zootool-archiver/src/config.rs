use std::path::PathBuf;

use anyhow::Context;

use crate::sync::index::OrphanPolicy;

pub const USERNAME_VAR: &str = "ZOOTOOL_USERNAME";
pub const API_KEY_VAR: &str = "ZOOTOOL_API_KEY";
pub const ENDPOINT_VAR: &str = "ZOOTOOL_ENDPOINT";
pub const DROP_ORPHANS_VAR: &str = "ZOOTOOL_DROP_ORPHANS";

#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    pub root: PathBuf,
    pub username: String,
    pub api_key: String,
    /// Alternate API base url, mainly for testing against a local server.
    pub endpoint: Option<String>,
    pub orphan_policy: OrphanPolicy,
}

impl ArchiverConfig {
    /// Merge CLI flags with the environment; flags win.
    pub fn resolve(
        directory: PathBuf,
        username_flag: Option<String>,
        api_key_flag: Option<String>,
        drop_orphans_flag: bool,
    ) -> anyhow::Result<Self> {
        let username = username_flag
            .or_else(|| env_non_empty(USERNAME_VAR))
            .with_context(|| format!("username missing: pass --username or set {USERNAME_VAR}"))?;
        let api_key = api_key_flag
            .or_else(|| env_non_empty(API_KEY_VAR))
            .with_context(|| format!("api key missing: pass --key or set {API_KEY_VAR}"))?;
        let endpoint = env_non_empty(ENDPOINT_VAR);
        let orphan_policy = if drop_orphans_flag || read_bool_env(DROP_ORPHANS_VAR, false) {
            OrphanPolicy::Drop
        } else {
            OrphanPolicy::Keep
        };

        Ok(Self {
            root: directory,
            username,
            api_key,
            endpoint,
            orphan_policy,
        })
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_bool_env(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_bool(&value),
        Err(_) => default,
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "yes" | "on")
}
