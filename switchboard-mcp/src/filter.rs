//! Per-project tool filtering
//!
//! Tool preferences are `(project, server, tool-name) -> enabled` rows;
//! absence means enabled. A preference lookup failure must not take tool
//! listing down, so the filter fails open and returns the unfiltered list.

use tracing::{debug, error, info};
use uuid::Uuid;

use switchboard_interfaces::PreferenceRepository;

use crate::protocol::Tool;

/// Drop tools the project has disabled for this server
pub async fn filter_tools(
    preferences: &dyn PreferenceRepository,
    project_id: Uuid,
    server_id: Uuid,
    tools: Vec<Tool>,
) -> Vec<Tool> {
    let map = match preferences.map_for_server(project_id, server_id).await {
        Ok(map) => map,
        Err(e) => {
            error!(%project_id, %server_id, error = %e, "preference lookup failed, serving unfiltered tools");
            return tools;
        }
    };

    if map.is_empty() {
        return tools;
    }

    let total = tools.len();
    let filtered: Vec<Tool> = tools
        .into_iter()
        .filter(|tool| {
            let enabled = map.get(&tool.name).copied().unwrap_or(true);
            if !enabled {
                debug!(%server_id, tool = %tool.name, "tool disabled by preference");
            }
            enabled
        })
        .collect();

    if filtered.len() != total {
        info!(%project_id, %server_id, enabled = filtered.len(), total, "tool filtering applied");
    }

    filtered
}
