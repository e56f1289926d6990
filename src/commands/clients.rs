use super::{find_record, or_dash, report, require_session, send_chunked};
use crate::records::Client;
use crate::state::Context;
use crate::sync::FetchOutcome;

/// Manage billing clients
#[poise::command(
    slash_command,
    subcommands("list", "add", "edit", "remove", "refresh")
)]
pub async fn clients(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// List clients, optionally filtered by name or email
#[poise::command(slash_command)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Search term"] search: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let collection = &ctx.data().clients;
    if collection.is_loading() {
        ctx.say("Clients are still loading, try again shortly.").await?;
        return Ok(());
    }

    let found = collection.search(search.as_deref().unwrap_or("")).await;
    if found.is_empty() {
        ctx.say("No clients found.").await?;
        return Ok(());
    }

    let mut output = format!("**Clients** ({})\n\n", found.len());
    for c in &found {
        output.push_str(&format!(
            "`{}` **{}**\n  {} | {} | {}\n",
            c.id,
            c.name,
            or_dash(&c.address),
            or_dash(&c.email),
            or_dash(&c.phone)
        ));
    }
    send_chunked(&ctx, &output).await
}

/// Add a client
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Client name"] name: String,
    #[description = "Address"] address: Option<String>,
    #[description = "Email"] email: Option<String>,
    #[description = "Phone"] phone: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let client = Client::new(
        name.trim(),
        address.as_deref().unwrap_or("").trim(),
        email.as_deref().unwrap_or("").trim(),
        phone.as_deref().unwrap_or("").trim(),
    );
    let result = ctx.data().clients.add(client).await;
    report(&ctx, result, |c| {
        format!("Client **{}** added (id `{}`).", c.name, c.id)
    })
    .await
}

/// Edit a client; omitted fields keep their current value
#[poise::command(slash_command)]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Client id"] id: String,
    #[description = "Client name"] name: Option<String>,
    #[description = "Address"] address: Option<String>,
    #[description = "Email"] email: Option<String>,
    #[description = "Phone"] phone: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let collection = &ctx.data().clients;
    let Some(mut client) = find_record(&ctx, collection, &id).await? else {
        return Ok(());
    };

    if let Some(v) = name {
        client.name = v.trim().to_string();
    }
    if let Some(v) = address {
        client.address = v.trim().to_string();
    }
    if let Some(v) = email {
        client.email = v.trim().to_string();
    }
    if let Some(v) = phone {
        client.phone = v.trim().to_string();
    }

    let result = collection.update(client).await;
    report(&ctx, result, |c| format!("Client **{}** updated.", c.name)).await
}

/// Remove a client
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Client id"] id: String,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let collection = &ctx.data().clients;
    let Some(client) = find_record(&ctx, collection, &id).await? else {
        return Ok(());
    };
    let result = collection.delete(&client.id).await;
    report(&ctx, result, |_| format!("Client **{}** removed.", client.name)).await
}

/// Reload clients from the backend
#[poise::command(slash_command)]
pub async fn refresh(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    ctx.defer().await?;
    let msg = match ctx.data().clients.fetch_all().await {
        FetchOutcome::Remote(n) => format!("Loaded {} clients.", n),
        FetchOutcome::Cache(n) => format!("Backend unavailable; showing {} cached clients.", n),
        FetchOutcome::Defaults(n) => format!("No clients stored; showing {} defaults.", n),
        FetchOutcome::Unchanged => "Backend unavailable; client list unchanged.".to_string(),
    };
    ctx.say(msg).await?;
    Ok(())
}
