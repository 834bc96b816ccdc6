//! OIDC Token Verifier
//!
//! Verifies a single ID token against the issuer's published JWKS and prints
//! the validated claims as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use oidc_token_verifier::oidc::{
    cognito_issuer, TokenVerifier, VerifierConfig, VerifierConfigOverrides,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "oidc-token-verifier")]
#[command(about = "Verify an OIDC ID token against the issuer's JWKS")]
struct Args {
    /// JSON configuration file
    #[arg(long, env = "VERIFIER_CONFIG")]
    config: Option<PathBuf>,

    /// Cognito region (with --user-pool-id, derives issuer and JWKS URL)
    #[arg(long, env = "COGNITO_REGION")]
    region: Option<String>,

    /// Cognito user pool ID
    #[arg(long, env = "COGNITO_USER_POOL_ID")]
    user_pool_id: Option<String>,

    /// Expected audience (app client ID)
    #[arg(long, env = "COGNITO_APP_CLIENT_ID")]
    client_id: Option<String>,

    /// Expected issuer, overrides the Cognito-derived one
    #[arg(long, env = "OIDC_ISSUER")]
    issuer: Option<String>,

    /// JWKS endpoint, defaults to {issuer}/.well-known/jwks.json
    #[arg(long, env = "OIDC_JWKS_URL")]
    jwks_url: Option<String>,

    /// Clock skew tolerance in seconds
    #[arg(long, env = "CLOCK_SKEW_SECS")]
    clock_skew_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, env = "VERIFIER_VERBOSE")]
    verbose: bool,

    /// Token to verify; read from stdin when omitted
    token: Option<String>,
}

/// Layer command line settings over the optional config file.
fn build_config(args: &Args) -> Result<VerifierConfig> {
    let mut config = match args.config {
        Some(ref path) => VerifierConfig::from_file(path)?,
        None => VerifierConfig::default(),
    };

    let cognito = match (&args.region, &args.user_pool_id) {
        (Some(region), Some(pool)) => Some(cognito_issuer(region, pool)),
        _ => None,
    };

    let overrides = VerifierConfigOverrides {
        issuer: args.issuer.clone().or(cognito),
        client_id: args.client_id.clone(),
        jwks_url: args.jwks_url.clone(),
        clock_skew_secs: args.clock_skew_secs,
        ..Default::default()
    };
    overrides.apply_to(&mut config);

    Ok(config)
}

async fn read_token(args: &Args) -> Result<String> {
    let token = match args.token {
        Some(ref token) => token.clone(),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read token from stdin")?;
            buf
        }
    };
    Ok(token.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = build_config(&args)?;
    info!(
        issuer = %config.issuer,
        jwks_url = %config.jwks_url(),
        cache_ttl_secs = config.cache_ttl_secs,
        "Configuration loaded"
    );

    let verifier = TokenVerifier::from_config(&config)?;
    let token = read_token(&args).await?;

    match verifier.verify(&token).await {
        Ok(claims) => {
            if let Some(identity) = claims.identity() {
                info!(user_id = %identity.user_id, email = ?identity.email, "Token accepted");
            }
            println!("{}", serde_json::to_string_pretty(&claims)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_infrastructure() => {
            warn!(error = %e, "Token could not be verified");
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            warn!(error = %e, "Token rejected");
            Ok(ExitCode::FAILURE)
        }
    }
}
