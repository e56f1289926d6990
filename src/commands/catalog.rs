//! Reference tables: departments, HSN/SAC codes, technical and terms clauses.

use super::{find_record, or_dash, report, require_admin, require_session, send_chunked};
use crate::records::{Department, HsnCode, Technical, Term};
use crate::state::Context;
use crate::sync::{Record, SyncedCollection};

async fn list_records<T: Record>(
    ctx: &Context<'_>,
    collection: &SyncedCollection<T>,
    title: &str,
    search: Option<&str>,
    line: impl Fn(&T) -> String,
) -> Result<(), anyhow::Error> {
    if collection.is_loading() {
        ctx.say(format!("{} are still loading, try again shortly.", title))
            .await?;
        return Ok(());
    }
    let found = collection.search(search.unwrap_or("")).await;
    if found.is_empty() {
        ctx.say(format!("No {} found.", title.to_lowercase())).await?;
        return Ok(());
    }

    let mut output = format!("**{}** ({})\n\n", title, found.len());
    for record in &found {
        output.push_str(&line(record));
        output.push('\n');
    }
    send_chunked(ctx, &output).await
}

async fn remove_record<T: Record>(
    ctx: &Context<'_>,
    collection: &SyncedCollection<T>,
    id: &str,
) -> Result<(), anyhow::Error> {
    let Some(record) = find_record(ctx, collection, id).await? else {
        return Ok(());
    };
    let result = collection.delete(record.id()).await;
    report(ctx, result, |_| format!("{} `{}` removed.", T::ENTITY, record.id())).await
}

// Departments

/// Manage departments (admin)
#[poise::command(
    slash_command,
    subcommands("departments_list", "departments_add", "departments_rename", "departments_remove")
)]
pub async fn departments(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// List departments
#[poise::command(slash_command, rename = "list")]
pub async fn departments_list(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    list_records(&ctx, &ctx.data().departments, "Departments", None, |d| {
        format!("`{}` {}", d.id, d.name)
    })
    .await
}

/// Add a department
#[poise::command(slash_command, rename = "add")]
pub async fn departments_add(
    ctx: Context<'_>,
    #[description = "Department name"] name: String,
) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    let dept = Department {
        name: name.trim().to_string(),
        ..Default::default()
    };
    let result = ctx.data().departments.add(dept).await;
    report(&ctx, result, |d| format!("Department **{}** added.", d.name)).await
}

/// Rename a department
#[poise::command(slash_command, rename = "rename")]
pub async fn departments_rename(
    ctx: Context<'_>,
    #[description = "Department id"] id: String,
    #[description = "New name"] name: String,
) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    let collection = &ctx.data().departments;
    let Some(mut dept) = find_record(&ctx, collection, &id).await? else {
        return Ok(());
    };
    dept.name = name.trim().to_string();
    let result = collection.update(dept).await;
    report(&ctx, result, |d| format!("Department renamed to **{}**.", d.name)).await
}

/// Remove a department
#[poise::command(slash_command, rename = "remove")]
pub async fn departments_remove(
    ctx: Context<'_>,
    #[description = "Department id"] id: String,
) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    remove_record(&ctx, &ctx.data().departments, &id).await
}

// HSN/SAC codes

/// Manage HSN/SAC codes (admin)
#[poise::command(
    slash_command,
    subcommands("hsn_list", "hsn_add", "hsn_edit", "hsn_remove")
)]
pub async fn hsn(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// List HSN/SAC codes
#[poise::command(slash_command, rename = "list")]
pub async fn hsn_list(
    ctx: Context<'_>,
    #[description = "Search code or description"] search: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    list_records(&ctx, &ctx.data().hsn_codes, "HSN/SAC codes", search.as_deref(), |h| {
        format!("`{}` **{}** {}", h.id, h.code, h.description)
    })
    .await
}

/// Add an HSN/SAC code
#[poise::command(slash_command, rename = "add")]
pub async fn hsn_add(
    ctx: Context<'_>,
    #[description = "HSN/SAC code"] code: String,
    #[description = "Description"] description: String,
) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    let entry = HsnCode {
        code: code.trim().to_string(),
        description: description.trim().to_string(),
        ..Default::default()
    };
    let result = ctx.data().hsn_codes.add(entry).await;
    report(&ctx, result, |h| format!("HSN/SAC code **{}** added.", h.code)).await
}

/// Edit an HSN/SAC code
#[poise::command(slash_command, rename = "edit")]
pub async fn hsn_edit(
    ctx: Context<'_>,
    #[description = "Entry id"] id: String,
    #[description = "HSN/SAC code"] code: Option<String>,
    #[description = "Description"] description: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    let collection = &ctx.data().hsn_codes;
    let Some(mut entry) = find_record(&ctx, collection, &id).await? else {
        return Ok(());
    };
    if let Some(v) = code {
        entry.code = v.trim().to_string();
    }
    if let Some(v) = description {
        entry.description = v.trim().to_string();
    }
    let result = collection.update(entry).await;
    report(&ctx, result, |h| format!("HSN/SAC code **{}** updated.", h.code)).await
}

/// Remove an HSN/SAC code
#[poise::command(slash_command, rename = "remove")]
pub async fn hsn_remove(
    ctx: Context<'_>,
    #[description = "Entry id"] id: String,
) -> Result<(), anyhow::Error> {
    if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }
    remove_record(&ctx, &ctx.data().hsn_codes, &id).await
}

// Technicals

/// Manage technical clauses
#[poise::command(
    slash_command,
    subcommands("technicals_list", "technicals_add", "technicals_edit", "technicals_remove")
)]
pub async fn technicals(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// List technical clauses
#[poise::command(slash_command, rename = "list")]
pub async fn technicals_list(
    ctx: Context<'_>,
    #[description = "Search text or type"] search: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    list_records(&ctx, &ctx.data().technicals, "Technicals", search.as_deref(), |t| {
        format!("`{}` [{}] {}", t.id, or_dash(&t.kind), t.text)
    })
    .await
}

/// Add a technical clause
#[poise::command(slash_command, rename = "add")]
pub async fn technicals_add(
    ctx: Context<'_>,
    #[description = "Clause text"] text: String,
    #[description = "Type"] kind: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let clause = Technical {
        text: text.trim().to_string(),
        kind: kind.unwrap_or_default().trim().to_string(),
        ..Default::default()
    };
    let result = ctx.data().technicals.add(clause).await;
    report(&ctx, result, |t| format!("Technical added (id `{}`).", t.id)).await
}

/// Edit a technical clause
#[poise::command(slash_command, rename = "edit")]
pub async fn technicals_edit(
    ctx: Context<'_>,
    #[description = "Clause id"] id: String,
    #[description = "Clause text"] text: Option<String>,
    #[description = "Type"] kind: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let collection = &ctx.data().technicals;
    let Some(mut clause) = find_record(&ctx, collection, &id).await? else {
        return Ok(());
    };
    if let Some(v) = text {
        clause.text = v.trim().to_string();
    }
    if let Some(v) = kind {
        clause.kind = v.trim().to_string();
    }
    let result = collection.update(clause).await;
    report(&ctx, result, |t| format!("Technical `{}` updated.", t.id)).await
}

/// Remove a technical clause
#[poise::command(slash_command, rename = "remove")]
pub async fn technicals_remove(
    ctx: Context<'_>,
    #[description = "Clause id"] id: String,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    remove_record(&ctx, &ctx.data().technicals, &id).await
}

// Terms and conditions

/// Manage terms and conditions
#[poise::command(
    slash_command,
    subcommands("terms_list", "terms_add", "terms_edit", "terms_remove")
)]
pub async fn terms(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// List terms
#[poise::command(slash_command, rename = "list")]
pub async fn terms_list(
    ctx: Context<'_>,
    #[description = "Search text or type"] search: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    list_records(&ctx, &ctx.data().terms, "Terms", search.as_deref(), |t| {
        format!("`{}` [{}] {}", t.id, t.kind, t.text)
    })
    .await
}

/// Add a term
#[poise::command(slash_command, rename = "add")]
pub async fn terms_add(
    ctx: Context<'_>,
    #[description = "Term text"] text: String,
    #[description = "Type (default: general)"] kind: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let mut term = Term {
        text: text.trim().to_string(),
        ..Default::default()
    };
    if let Some(k) = kind.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        term.kind = k;
    }
    let result = ctx.data().terms.add(term).await;
    report(&ctx, result, |t| format!("Term added (id `{}`).", t.id)).await
}

/// Edit a term
#[poise::command(slash_command, rename = "edit")]
pub async fn terms_edit(
    ctx: Context<'_>,
    #[description = "Term id"] id: String,
    #[description = "Term text"] text: Option<String>,
    #[description = "Type"] kind: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let collection = &ctx.data().terms;
    let Some(mut term) = find_record(&ctx, collection, &id).await? else {
        return Ok(());
    };
    if let Some(v) = text {
        term.text = v.trim().to_string();
    }
    if let Some(v) = kind {
        term.kind = v.trim().to_string();
    }
    let result = collection.update(term).await;
    report(&ctx, result, |t| format!("Term `{}` updated.", t.id)).await
}

/// Remove a term
#[poise::command(slash_command, rename = "remove")]
pub async fn terms_remove(
    ctx: Context<'_>,
    #[description = "Term id"] id: String,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    remove_record(&ctx, &ctx.data().terms, &id).await
}
