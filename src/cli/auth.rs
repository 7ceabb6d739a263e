//! CLI auth command handlers.

use crate::auth::{AuthorizationFlow, CallbackParams, TokenManager};
use crate::config::GatewayConfig;

use super::CompleteArgs;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Handle `qbo-gateway auth url`.
pub fn handle_url(config: &GatewayConfig) -> CliResult {
    config.validate()?;
    let manager = TokenManager::from_config(config)?;
    let request = AuthorizationFlow::from_config(config, manager).start()?;
    println!("🔗 Visit: {}", request.authorize_url);
    println!("📋 Expected state: {}", request.state);
    println!("   Then run: qbo-gateway auth complete --code <code> --realm-id <realmId> --state <state> --expected-state {}", request.state);
    Ok(())
}

/// Handle `qbo-gateway auth complete`.
pub async fn handle_complete(config: &GatewayConfig, args: CompleteArgs) -> CliResult {
    config.validate()?;
    let manager = TokenManager::from_config(config)?;
    let flow = AuthorizationFlow::from_config(config, manager);
    let params = CallbackParams {
        code: Some(args.code),
        // Without --state, the one we expect stands in for it.
        state: args.state.or_else(|| args.expected_state.clone()),
        realm_id: Some(args.realm_id),
        error: None,
    };
    let credential = flow.complete(params, args.expected_state.as_deref()).await?;
    println!("✅ Connected to realm {}", credential.tenant_id);
    println!(
        "   Access token expires {}",
        credential.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

/// Handle `qbo-gateway auth status`.
pub async fn handle_status(config: &GatewayConfig) -> CliResult {
    let manager = TokenManager::from_config(config)?;
    let status = manager.status().await;

    println!("🔐 Credential Status\n");
    match status.realm_id {
        Some(realm_id) if status.is_authenticated => {
            println!(
                "  Realm {realm_id}: ✅ Connected ({} min left)",
                status.minutes_until_expiry
            );
        }
        Some(realm_id) => {
            println!("  Realm {realm_id}: ⚠️  Access token expired");
        }
        None => println!("  ❌ Not connected (run `qbo-gateway auth url` to authorize)"),
    }
    println!("  Environment: {}", config.environment);
    println!("  Token file: {}", config.token_path.display());
    Ok(())
}

/// Handle `qbo-gateway auth refresh`.
pub async fn handle_refresh(config: &GatewayConfig) -> CliResult {
    config.validate()?;
    let manager = TokenManager::from_config(config)?;
    let credential = manager.try_refresh_token().await?;
    println!(
        "✅ Access token refreshed (expires {})",
        credential.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

/// Handle `qbo-gateway auth disconnect`.
pub async fn handle_disconnect(config: &GatewayConfig) -> CliResult {
    let manager = TokenManager::from_config(config)?;
    if !manager.revoke_token().await {
        return Err(format!(
            "could not delete credential file {}",
            config.token_path.display()
        )
        .into());
    }
    println!("✅ Disconnected");
    Ok(())
}
