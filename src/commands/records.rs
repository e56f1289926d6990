use super::{require_admin, require_session, send_chunked};
use crate::backend::RecordId;
use crate::state::Context;

/// Saved quotations and invoices
#[poise::command(slash_command, subcommands("search", "open", "remove"))]
pub async fn records(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Search saved records by number, client or type
#[poise::command(slash_command)]
pub async fn search(
    ctx: Context<'_>,
    #[description = "Search term (empty lists everything)"] term: Option<String>,
    #[description = "Reload from the backend first"] refresh: Option<bool>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let saved = &ctx.data().saved;
    if refresh.unwrap_or(false) || saved.is_loading() {
        ctx.defer().await?;
        if let Err(e) = saved.fetch().await {
            ctx.say(format!("Failed to load saved records. {}", e)).await?;
            return Ok(());
        }
    }

    let found = saved.search(term.as_deref().unwrap_or("")).await;
    if found.is_empty() {
        ctx.say("No records found.").await?;
        return Ok(());
    }

    let mut output = format!("**Saved records** (total: {})\n\n", found.len());
    for r in &found {
        output.push_str(&format!(
            "`{}` {} **{}** {}\n  Client: {} | By: {}\n",
            r.id,
            r.created_on(),
            r.quote_number,
            r.document_type,
            r.client_name.as_deref().unwrap_or("-"),
            r.created_by_name()
        ));
    }
    send_chunked(&ctx, &output).await
}

/// Reopen a saved record as your current draft
#[poise::command(slash_command)]
pub async fn open(
    ctx: Context<'_>,
    #[description = "Record id"] id: String,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let data = ctx.data();
    let Some(record) = data.saved.get(&RecordId::parse(&id)).await else {
        ctx.say(format!("No saved record with id `{}`.", id.trim())).await?;
        return Ok(());
    };
    match record.to_draft() {
        Ok(draft) => {
            data.open_draft(ctx.author().id.get(), draft).await;
            ctx.say(format!(
                "Opened `{}`. Use `/console quote show` to preview.",
                record.quote_number
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format!("Cannot open `{}`: {}", record.quote_number, e))
                .await?;
        }
    }
    Ok(())
}

/// Delete a saved record (admin only)
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Record id"] id: String,
) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    let saved = &ctx.data().saved;
    let id = RecordId::parse(&id);
    let label = saved
        .get(&id)
        .await
        .map(|r| r.quote_number)
        .unwrap_or_else(|| id.to_string());

    ctx.defer().await?;
    match saved.delete(&id).await {
        Ok(()) => ctx.say(format!("Record `{}` has been removed.", label)).await?,
        Err(e) => ctx.say(format!("Failed to delete record. {}", e)).await?,
    };
    Ok(())
}
