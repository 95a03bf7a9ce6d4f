use std::path::PathBuf;

use anyhow::Result;

use crate::cli::actions::Action;
use crate::cli::commands::{ARG_INSECURE_VERIFIER, ARG_VERIFIER_KEYS};

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        base_url: matches
            .get_one("base-url")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --base-url"))?,
        frontend_url: matches
            .get_one("frontend-url")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --frontend-url"))?,
        session_ttl: matches
            .get_one::<i64>("session-ttl")
            .copied()
            .unwrap_or(crate::session::DEFAULT_TTL_SECONDS),
        retention: matches
            .get_one::<i64>("retention")
            .copied()
            .unwrap_or(crate::session::DEFAULT_RETENTION_SECONDS),
        verifier_keys: matches.get_one::<PathBuf>(ARG_VERIFIER_KEYS).cloned(),
        insecure_verifier: matches.get_flag(ARG_INSECURE_VERIFIER),
    })
}
