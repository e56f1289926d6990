use tracing::info;

use super::{require_session, send_chunked};
use crate::backend::RecordId;
use crate::docid::DocType;
use crate::quote::{format_inr, BillTo, QuotationDraft};
use crate::state::Context;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum DocKind {
    Quotation,
    #[name = "Tax Invoice"]
    TaxInvoice,
    #[name = "Proforma Invoice"]
    ProformaInvoice,
    #[name = "Purchase Order"]
    PurchaseOrder,
    #[name = "Delivery Challan"]
    DeliveryChallan,
}

impl From<DocKind> for DocType {
    fn from(kind: DocKind) -> Self {
        match kind {
            DocKind::Quotation => DocType::Quotation,
            DocKind::TaxInvoice => DocType::TaxInvoice,
            DocKind::ProformaInvoice => DocType::ProformaInvoice,
            DocKind::PurchaseOrder => DocType::PurchaseOrder,
            DocKind::DeliveryChallan => DocType::DeliveryChallan,
        }
    }
}

const NO_DRAFT: &str = "No open document. Start one with `/console quote new`.";

/// Build quotations and invoices
#[poise::command(
    slash_command,
    subcommands("new", "kind", "item", "drop_item", "client", "clauses", "show", "save", "discard")
)]
pub async fn quote(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Start a new document, replacing any open draft
#[poise::command(slash_command)]
pub async fn new(
    ctx: Context<'_>,
    #[description = "Document type"] doc_type: Option<DocKind>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let data = ctx.data();
    let doc_type: DocType = doc_type.map(Into::into).unwrap_or_default();
    let draft = QuotationDraft::new(doc_type, &data.doc_ids);
    let doc_id = draft.doc_id.clone();
    let replaced = data.open_draft(ctx.author().id.get(), draft).await;

    let mut msg = format!("New **{}** `{}`.", doc_type.label(), doc_id);
    if let Some(old) = replaced {
        msg.push_str(&format!(" Discarded unsaved draft `{}`.", old.doc_id));
    }
    ctx.say(msg).await?;
    Ok(())
}

/// Change the document type (issues a new number)
#[poise::command(slash_command, rename = "type")]
pub async fn kind(
    ctx: Context<'_>,
    #[description = "Document type"] doc_type: DocKind,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let data = ctx.data();
    let doc_type: DocType = doc_type.into();
    let changed = data
        .with_draft(ctx.author().id.get(), |d| {
            d.set_doc_type(doc_type, &data.doc_ids);
            d.doc_id.clone()
        })
        .await;
    match changed {
        Some(id) => ctx.say(format!("Now a **{}**: `{}`.", doc_type.label(), id)).await?,
        None => ctx.say(NO_DRAFT).await?,
    };
    Ok(())
}

/// Add a line item
#[poise::command(slash_command)]
pub async fn item(
    ctx: Context<'_>,
    #[description = "Description"] description: String,
    #[description = "Unit price"] price: f64,
    #[description = "Quantity"] qty: f64,
    #[description = "Unit, e.g. Nos, Test, Visit"] unit: Option<String>,
    #[description = "HSN/SAC code"] hsn: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let result = ctx
        .data()
        .with_draft(ctx.author().id.get(), |d| {
            d.add_item(&description, hsn.as_deref(), unit.as_deref(), price, qty)
                .map(|row| (row, d.subtotal()))
        })
        .await;
    match result {
        None => ctx.say(NO_DRAFT).await?,
        Some(Ok((row, subtotal))) => {
            ctx.say(format!(
                "Added item #{}. Subtotal: {}",
                row,
                format_inr(subtotal)
            ))
            .await?
        }
        Some(Err(e)) => ctx.say(format!("Validation error: {}", e)).await?,
    };
    Ok(())
}

/// Remove a line item by its row number
#[poise::command(slash_command, rename = "drop")]
pub async fn drop_item(
    ctx: Context<'_>,
    #[description = "Row number"] row: u32,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let result = ctx
        .data()
        .with_draft(ctx.author().id.get(), |d| d.remove_item(row))
        .await;
    match result {
        None => ctx.say(NO_DRAFT).await?,
        Some(Ok(item)) => ctx.say(format!("Removed #{} {}.", item.row, item.description)).await?,
        Some(Err(e)) => ctx.say(format!("Error: {}", e)).await?,
    };
    Ok(())
}

/// Bill the document to a saved client, or set billing fields directly
#[poise::command(slash_command)]
pub async fn client(
    ctx: Context<'_>,
    #[description = "Client id or exact name"] client: Option<String>,
    #[description = "Contact name"] name: Option<String>,
    #[description = "Company"] company: Option<String>,
    #[description = "Address"] address: Option<String>,
    #[description = "Email"] email: Option<String>,
    #[description = "Phone"] phone: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let data = ctx.data();

    let base = match client.as_deref().map(str::trim) {
        Some(key) => {
            let by_id = data.clients.get(&RecordId::parse(key)).await;
            let found = match by_id {
                Some(c) => Some(c),
                None => data
                    .clients
                    .items()
                    .await
                    .into_iter()
                    .find(|c| c.name.eq_ignore_ascii_case(key)),
            };
            match found {
                Some(c) => Some(BillTo::from(&c)),
                None => {
                    ctx.say(format!("No client matching `{}`.", key)).await?;
                    return Ok(());
                }
            }
        }
        None => None,
    };

    let billed = data
        .with_draft(ctx.author().id.get(), |d| {
            if let Some(base) = base {
                d.bill_to = base;
            }
            let b = &mut d.bill_to;
            for (slot, value) in [
                (&mut b.name, name),
                (&mut b.company, company),
                (&mut b.address, address),
                (&mut b.email, email),
                (&mut b.phone, phone),
            ] {
                if let Some(v) = value {
                    *slot = v.trim().to_string();
                }
            }
            b.name.clone()
        })
        .await;
    match billed {
        Some(name) if name.is_empty() => ctx.say("Billing details updated.").await?,
        Some(name) => ctx.say(format!("Billing to **{}**.", name)).await?,
        None => ctx.say(NO_DRAFT).await?,
    };
    Ok(())
}

fn parse_ids(list: &str) -> Vec<RecordId> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(RecordId::parse)
        .collect()
}

/// Attach technical and terms clauses by id (comma separated)
#[poise::command(slash_command)]
pub async fn clauses(
    ctx: Context<'_>,
    #[description = "Technical ids, e.g. 1,4,5"] technicals: Option<String>,
    #[description = "Term ids, e.g. 2,3"] terms: Option<String>,
) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let data = ctx.data();
    let mut missing = Vec::new();

    let mut technical_texts = None;
    if let Some(list) = technicals.as_deref() {
        let mut texts = Vec::new();
        for id in parse_ids(list) {
            match data.technicals.get(&id).await {
                Some(t) => texts.push(t.text),
                None => missing.push(format!("technical `{}`", id)),
            }
        }
        technical_texts = Some(texts);
    }
    let mut term_texts = None;
    if let Some(list) = terms.as_deref() {
        let mut texts = Vec::new();
        for id in parse_ids(list) {
            match data.terms.get(&id).await {
                Some(t) => texts.push(t.text),
                None => missing.push(format!("term `{}`", id)),
            }
        }
        term_texts = Some(texts);
    }

    if !missing.is_empty() {
        ctx.say(format!("Not found: {}. Nothing changed.", missing.join(", ")))
            .await?;
        return Ok(());
    }

    let counts = data
        .with_draft(ctx.author().id.get(), |d| {
            if let Some(texts) = technical_texts {
                d.technicals = texts;
            }
            if let Some(texts) = term_texts {
                d.terms = texts;
            }
            (d.technicals.len(), d.terms.len())
        })
        .await;
    match counts {
        Some((t, c)) => ctx.say(format!("{} technicals and {} terms attached.", t, c)).await?,
        None => ctx.say(NO_DRAFT).await?,
    };
    Ok(())
}

/// Preview the open document
#[poise::command(slash_command)]
pub async fn show(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    let data = ctx.data();
    let Some(draft) = data.with_draft(ctx.author().id.get(), |d| d.clone()).await else {
        ctx.say(NO_DRAFT).await?;
        return Ok(());
    };

    let site = data.store.site_content().await;
    let rates = data.settings.tax_rates().await;
    let bank = data.settings.bank_details().await;
    let payment = data.settings.payment_terms().await;
    let text = draft.render_markdown(&site, rates, bank.as_ref(), payment.as_deref());
    send_chunked(&ctx, &text).await
}

/// Save the open document to saved records
#[poise::command(slash_command)]
pub async fn save(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let Some(session) = require_session(&ctx).await? else {
        return Ok(());
    };
    let data = ctx.data();
    let user_id = ctx.author().id.get();
    let Some(draft) = data.with_draft(user_id, |d| d.clone()).await else {
        ctx.say(NO_DRAFT).await?;
        return Ok(());
    };

    ctx.defer().await?;
    let rates = data.settings.tax_rates().await;
    match data.saved.save(&draft, &session, rates).await {
        Ok(record) => {
            data.close_draft(user_id).await;
            info!(quote_number = %record.quote_number, "document saved from console");
            ctx.say(format!(
                "Saved **{}** `{}` (total {}).",
                record.document_type,
                record.quote_number,
                format_inr(record.grand_total.unwrap_or_default())
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format!("Error: {}", e)).await?;
        }
    }
    Ok(())
}

/// Discard the open document without saving
#[poise::command(slash_command)]
pub async fn discard(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }
    match ctx.data().close_draft(ctx.author().id.get()).await {
        Some(d) => ctx.say(format!("Discarded `{}`.", d.doc_id)).await?,
        None => ctx.say(NO_DRAFT).await?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(
            parse_ids("1, 4,,tech_9 "),
            vec![RecordId::Int(1), RecordId::Int(4), RecordId::from("tech_9")]
        );
        assert!(parse_ids("").is_empty());
    }

    #[test]
    fn test_doc_kind_maps_to_doc_type() {
        assert_eq!(DocType::from(DocKind::TaxInvoice).code(), "TI");
        assert_eq!(DocType::from(DocKind::DeliveryChallan).label(), "Delivery Challan");
    }
}
