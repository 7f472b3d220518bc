// Audit exports - CSV dumps operators diff between runs
// The hub set explains every suppression decision of a run; the network
// summary table is what gets eyeballed when someone reports a cluster
// that looks too big or too fragmented.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::db::load_networks;
use crate::hubs::HubEntry;

/// Write one row per flagged hub: kind, key, degree, reason.
pub fn export_hub_report(entries: &[HubEntry], path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating hub report {}", path.display()))?;

    writer.write_record(["edge_kind", "key", "degree", "reason"])?;
    for entry in entries {
        let degree = entry.degree.to_string();
        writer.write_record([
            entry.kind.as_str(),
            entry.key.as_str(),
            degree.as_str(),
            entry.reason.as_str(),
        ])?;
    }
    writer.flush()?;

    Ok(entries.len())
}

/// Write the current network generation: one row per network.
pub fn export_networks(conn: &Connection, path: &Path) -> Result<usize> {
    let networks = load_networks(conn).context("reading networks for export")?;

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating network export {}", path.display()))?;

    writer.write_record([
        "network_id",
        "canonical_name",
        "business_count",
        "principal_count",
        "property_count",
        "total_assessed_value",
    ])?;
    for network in &networks {
        let businesses = network.business_count.to_string();
        let principals = network.principal_count.to_string();
        let properties = network.property_count.to_string();
        let assessed = format!("{:.2}", network.total_assessed_value);
        writer.write_record([
            network.id.as_str(),
            network.canonical_name.as_str(),
            businesses.as_str(),
            principals.as_str(),
            properties.as_str(),
            assessed.as_str(),
        ])?;
    }
    writer.flush()?;

    Ok(networks.len())
}
