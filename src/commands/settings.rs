use tracing::info;

use super::{or_dash, require_admin, require_session};
use crate::settings::SettingValue;
use crate::state::Context;

/// Show or change application settings (admin only)
#[poise::command(slash_command)]
pub async fn settings(
    ctx: Context<'_>,
    #[description = "Setting key, e.g. tax_cgst | tax_sgst | bank_name | payment_terms"]
    key: Option<String>,
    #[description = "New value"] value: Option<String>,
) -> Result<(), anyhow::Error> {
    let Some(session) = require_admin(&ctx).await? else {
        return Ok(());
    };
    let settings = &ctx.data().settings;

    match (key.as_deref().map(str::trim), value) {
        // Show all
        (None, _) => {
            let all = settings.all().await;
            let mut output = String::from("**Settings**\n");
            for (k, v) in &all {
                output.push_str(&format!("`{}`: {}\n", k, or_dash(&v.to_string())));
            }
            ctx.say(output).await?;
        }
        (Some(""), _) => {
            ctx.say("Setting key cannot be empty.").await?;
        }
        // Show one
        (Some(k), None) => match settings.get(k).await {
            Some(v) => {
                ctx.say(format!("`{}`: {}", k, v)).await?;
            }
            None => {
                ctx.say(format!("`{}` is not set.", k)).await?;
            }
        },
        (Some(k), Some(raw)) => {
            let value = SettingValue::coerce(raw.trim());
            match settings.update_one(k, value.clone()).await {
                Ok(()) => {
                    info!(key = k, user = %session.username, "setting changed");
                    ctx.say(format!("`{}` set to {}", k, value)).await?;
                }
                Err(e) => {
                    ctx.say(format!("Error: {}", e)).await?;
                }
            }
        }
    }

    Ok(())
}

/// Show or change the site details printed on documents (admin only)
#[poise::command(slash_command)]
pub async fn site(
    ctx: Context<'_>,
    #[description = "name | phone | email | address | footer"] field: Option<String>,
    #[description = "New value"] value: Option<String>,
) -> Result<(), anyhow::Error> {
    if field.is_none() {
        if require_session(&ctx).await?.is_none() {
            return Ok(());
        }
    } else if require_admin(&ctx).await?.is_none() {
        return Ok(());
    }

    let store = &ctx.data().store;
    let mut content = store.site_content().await;

    match (field.as_deref(), value) {
        (None, _) => {
            let g = &content.global;
            ctx.say(format!(
                "**Site details**\n\
                 `name`: {}\n\
                 `phone`: {}\n\
                 `email`: {}\n\
                 `address`: {}\n\
                 `footer`: {}",
                g.site_name, g.contact_phone, g.contact_email, g.address, g.footer_about
            ))
            .await?;
        }
        (Some(field), Some(value)) => {
            let g = &mut content.global;
            let slot = match field.trim() {
                "name" => &mut g.site_name,
                "phone" => &mut g.contact_phone,
                "email" => &mut g.contact_email,
                "address" => &mut g.address,
                "footer" => &mut g.footer_about,
                other => {
                    ctx.say(format!(
                        "Unknown field `{}`. Valid: `name`, `phone`, `email`, `address`, `footer`",
                        other
                    ))
                    .await?;
                    return Ok(());
                }
            };
            *slot = value.trim().to_string();
            store.save_site_content(&content).await?;
            ctx.say(format!("Site `{}` updated.", field.trim())).await?;
        }
        (Some(_), None) => {
            ctx.say("Provide both `field` and `value`. Example: `/console site phone +91 80 1234 5678`")
                .await?;
        }
    }

    Ok(())
}
