//! First-run onboarding issues for an empty workspace.

use anyhow::Context;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::store::{Database, Filter, tables};

const ONBOARDING: [(&str, &str); 3] = [
    (
        "Get familiar with Tessera",
        "Open an issue, change its status with the toolbar or the `s` key, \
         and watch the board update in realtime.",
    ),
    (
        "Connect your tools",
        "Invite your team and point your integrations at this workspace.",
    ),
    (
        "Import your data",
        "Bring existing issues over, or just start fresh from the board.",
    ),
];

/// Seeds the three onboarding issues into a workspace that has none.
/// A workspace with any existing issue is left untouched. Returns the
/// number of issues inserted.
#[tracing::instrument(skip(db), fields(workspace = %workspace_id))]
pub async fn seed_default_issues<D: Database + ?Sized>(
    db: &D,
    workspace_id: Uuid,
    user_id: Uuid,
    team_key: &str,
) -> anyhow::Result<usize> {
    let existing = db
        .select(
            tables::ISSUES,
            &[Filter::eq("workspace_id", workspace_id.to_string())],
        )
        .await
        .context("check for existing issues")?;
    if !existing.is_empty() {
        return Ok(0);
    }

    for (n, (title, description)) in (1..).zip(ONBOARDING) {
        let row = json!({
            "workspace_id": workspace_id,
            "created_by": user_id,
            "title": title,
            "description": description,
            "status": "todo",
            "priority": "no_priority",
            "issue_number": n,
            "issue_key": format!("{team_key}-{n}"),
        });
        db.insert(tables::ISSUES, row)
            .await
            .context("insert onboarding issue")?;
    }

    info!(count = ONBOARDING.len(), "seeded onboarding issues");
    Ok(ONBOARDING.len())
}
