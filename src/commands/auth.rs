use tracing::info;

use super::{require_session, say_private, session_ctx};
use crate::session::SessionError;
use crate::state::Context;

/// Log in with your console username and password
#[poise::command(slash_command)]
pub async fn login(
    ctx: Context<'_>,
    #[description = "Username"] username: String,
    #[description = "Password"] password: String,
) -> Result<(), anyhow::Error> {
    ctx.defer_ephemeral().await?;
    let session = session_ctx(&ctx).await;

    match session.login(username.trim(), &password).await {
        Ok(s) => {
            info!(discord_user = %ctx.author().name, username = %s.username, "console login");
            say_private(
                &ctx,
                format!("Welcome back, **{}** (role: {}).", s.full_name, s.role),
            )
            .await?;
        }
        Err(SessionError::InvalidCredentials) => {
            say_private(&ctx, "Login failed: invalid username or password.").await?;
        }
        Err(e) => {
            say_private(&ctx, format!("Login failed: {}", e)).await?;
        }
    }
    Ok(())
}

/// Log out of the console
#[poise::command(slash_command)]
pub async fn logout(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let session = session_ctx(&ctx).await;
    if !session.is_authenticated().await {
        say_private(&ctx, "You are not logged in.").await?;
        return Ok(());
    }
    session.logout().await?;
    say_private(&ctx, "Logged out.").await?;
    Ok(())
}

/// Show who you are logged in as
#[poise::command(slash_command)]
pub async fn whoami(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let Some(s) = require_session(&ctx).await? else {
        return Ok(());
    };
    say_private(
        &ctx,
        format!(
            "**{}** (`{}`)\nRole: {}\nUser id: `{}`",
            s.full_name, s.username, s.role, s.id
        ),
    )
    .await?;
    Ok(())
}

/// Change your console password
#[poise::command(slash_command)]
pub async fn password(
    ctx: Context<'_>,
    #[description = "New password (min 6 characters)"] new_password: String,
    #[description = "Repeat the new password"] confirm: String,
) -> Result<(), anyhow::Error> {
    ctx.defer_ephemeral().await?;
    if require_session(&ctx).await?.is_none() {
        return Ok(());
    }

    match session_ctx(&ctx)
        .await
        .update_password(&new_password, &confirm)
        .await
    {
        Ok(()) => say_private(&ctx, "Password updated.").await?,
        Err(e) => say_private(&ctx, format!("Password not changed: {}", e)).await?,
    }
    Ok(())
}
