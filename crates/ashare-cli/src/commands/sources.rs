use ashare_core::{HealthStatus, ProviderId};
use serde::Serialize;

use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct SourceRow {
    id: ProviderId,
    name: &'static str,
    role: &'static str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    health: Option<HealthStatus>,
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    strategy: String,
    sources: Vec<SourceRow>,
}

pub async fn run(context: &Context) -> Result<CommandResult, CliError> {
    let plan = context.source_chain().await;

    let mut sources: Vec<SourceRow> = context
        .router
        .snapshots()
        .await
        .into_iter()
        .map(|snapshot| SourceRow {
            id: snapshot.id,
            name: snapshot.id.display_name(),
            role: "quote",
            status: snapshot.status_label(),
            health: Some(snapshot.health),
        })
        .collect();
    sources.push(SourceRow {
        id: ProviderId::Eastmoney,
        name: ProviderId::Eastmoney.display_name(),
        role: "limit_up_roster",
        status: "on_demand",
        health: None,
    });

    let data = serde_json::to_value(SourcesResponseData {
        strategy: context.router.strategy().to_string(),
        sources,
    })?;

    Ok(CommandResult::ok(data, plan))
}
