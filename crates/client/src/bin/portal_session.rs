//! Restore the portal session from the configured backend and print what the
//! navigation guard would decide for each route class.

use anyhow::Context;
use serde_json::json;

use portal_auth::RouteRequirements;
use portal_client::{Portal, PortalConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PortalConfig::from_env();
    portal_observability::init(config.log_format);

    let portal = Portal::from_config(config)?;
    let snapshot = portal.start().await;

    let report = json!({
        "snapshot": snapshot,
        "expiry_state": portal.monitor().state(),
        "remaining_ms": portal.monitor().remaining(),
        "routes": {
            "authenticated": portal.guard().explain(RouteRequirements::authenticated(), &snapshot),
            "verified": portal.guard().explain(RouteRequirements::verified(), &snapshot),
            "admin": portal.guard().explain(RouteRequirements::admin(), &snapshot),
        },
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render session report")?
    );

    portal.shutdown();
    Ok(())
}
