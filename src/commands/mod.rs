mod auth;
mod catalog;
mod clients;
mod quote;
mod records;
mod settings;

use std::sync::Arc;

use crate::backend::RecordId;
use crate::session::{Session, SessionContext};
use crate::state::Context;
use crate::sync::{Record, SyncError, SyncedCollection};

/// EESIPL quotation and billing console
#[poise::command(
    slash_command,
    subcommands(
        "auth::login",
        "auth::logout",
        "auth::whoami",
        "auth::password",
        "clients::clients",
        "catalog::departments",
        "catalog::hsn",
        "catalog::technicals",
        "catalog::terms",
        "settings::settings",
        "settings::site",
        "quote::quote",
        "records::records"
    )
)]
pub async fn console(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

const CHUNK_LEN: usize = 1990;

/// Send `text` as one or more messages under Discord's length limit,
/// splitting on newlines or spaces where possible.
pub(crate) async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in split_chunks(text, CHUNK_LEN) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

fn split_chunks(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let mut chunk_len = remaining.len().min(max);
        while !remaining.is_char_boundary(chunk_len) {
            chunk_len -= 1;
        }
        let split_at = if chunk_len < remaining.len() {
            remaining[..chunk_len]
                .rfind('\n')
                .or_else(|| remaining[..chunk_len].rfind(' '))
                .map(|i| i + 1)
                .unwrap_or(chunk_len)
        } else {
            chunk_len
        };
        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    chunks
}

/// Reply visible only to the invoking operator.
pub(crate) async fn say_private(ctx: &Context<'_>, text: impl Into<String>) -> Result<(), anyhow::Error> {
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

pub(crate) async fn session_ctx(ctx: &Context<'_>) -> Arc<SessionContext> {
    ctx.data().session_for(ctx.author().id.get()).await
}

/// The operator's session, or a login prompt and `None`.
pub(crate) async fn require_session(ctx: &Context<'_>) -> Result<Option<Session>, anyhow::Error> {
    match session_ctx(ctx).await.current().await {
        Some(session) => Ok(Some(session)),
        None => {
            say_private(ctx, "Please log in first with `/console login`.").await?;
            Ok(None)
        }
    }
}

pub(crate) async fn require_admin(ctx: &Context<'_>) -> Result<Option<Session>, anyhow::Error> {
    let Some(session) = require_session(ctx).await? else {
        return Ok(None);
    };
    if !session_ctx(ctx).await.is_admin().await {
        say_private(ctx, "This command is admin-only.").await?;
        return Ok(None);
    }
    Ok(Some(session))
}

/// Look up a record by id and tell the operator when it does not exist.
pub(crate) async fn find_record<T: Record>(
    ctx: &Context<'_>,
    collection: &SyncedCollection<T>,
    id: &str,
) -> Result<Option<T>, anyhow::Error> {
    let id = RecordId::parse(id);
    let found = collection.get(&id).await;
    if found.is_none() {
        ctx.say(format!("No {} with id `{}`.", T::ENTITY.to_lowercase(), id))
            .await?;
    }
    Ok(found)
}

/// Turn a mutation result into a reply. Failures are reported, not propagated.
pub(crate) async fn report<T>(
    ctx: &Context<'_>,
    result: Result<T, SyncError>,
    success: impl FnOnce(&T) -> String,
) -> Result<(), anyhow::Error> {
    match result {
        Ok(value) => ctx.say(success(&value)).await?,
        Err(e) if e.is_validation() => ctx.say(format!("Validation error: {}", e)).await?,
        Err(e) => ctx.say(format!("Error: {}", e)).await?,
    };
    Ok(())
}

pub(crate) fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}
