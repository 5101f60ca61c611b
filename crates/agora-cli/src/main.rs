//! Agora CLI - operator tooling for the session service
//!
//! Usage:
//!   agora hash-secret [secret]
//!   agora inspect-token <token>
//!   agora revoke-session <subject-id>
//!   agora show-config

use agora_api::auth::{
    credential_id, hash_password, validate_password_strength, TokenError, TokenIssuer,
};
use agora_api::session::{RedisSessionStore, SessionStore};
use agora_core::{AppConfig, SessionBackend, SystemClock};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Agora session service operator CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables take precedence
    #[arg(long, env = "AGORA_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a secret with the configured Argon2id cost, for seeding identities
    HashSecret {
        /// Secret to hash; read from stdin when omitted
        secret: Option<String>,
        /// Hash even if the secret fails the strength rules
        #[arg(long)]
        allow_weak: bool,
    },
    /// Verify a credential against the configured keys and print its claims
    InspectToken {
        token: String,
        #[arg(long, value_enum, default_value_t = Kind::Access)]
        kind: Kind,
    },
    /// Force-close an identity's session in the shared session store
    RevokeSession { subject_id: Uuid },
    /// Print the effective configuration with secrets redacted
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Access,
    Refresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::HashSecret { secret, allow_weak } => {
            let secret = match secret {
                Some(secret) => secret,
                None => read_line()?,
            };
            if !allow_weak {
                if let Err(reason) = validate_password_strength(&secret) {
                    bail!("{reason} (use --allow-weak to hash anyway)");
                }
            }
            println!("{}", hash_password(&secret, &config.hashing)?);
        }
        Commands::InspectToken { token, kind } => {
            config.tokens.validate()?;
            let issuer = TokenIssuer::new(&config.tokens, Arc::new(SystemClock));
            let claims = match kind {
                Kind::Access => serde_json::to_value(issuer.verify_access(&token).map_err(rejected)?)?,
                Kind::Refresh => {
                    serde_json::to_value(issuer.verify_refresh(&token).map_err(rejected)?)?
                }
            };
            let report = serde_json::json!({
                "credential_id": credential_id(&token),
                "claims": claims,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::RevokeSession { subject_id } => {
            if config.session_store.backend != SessionBackend::Redis {
                bail!("revoke-session needs the shared session store (SESSION_STORE=redis)");
            }
            let store = RedisSessionStore::connect(&config.session_store.redis_url)
                .await
                .context("Failed to connect to session store")?;
            store.delete_session(subject_id).await?;
            println!("Session of {subject_id} revoked");
        }
        Commands::ShowConfig => {
            let mut shown = config.clone();
            shown.tokens.access_secret = "<redacted>".to_string();
            shown.tokens.refresh_secret = "<redacted>".to_string();
            print!("{}", toml::to_string_pretty(&shown)?);
            match config.validate() {
                Ok(()) if config.tokens.uses_development_secrets() => {
                    eprintln!("warning: development signing secrets in use")
                }
                Ok(()) => {}
                Err(e) => eprintln!("invalid: {e}"),
            }
        }
    }

    Ok(())
}

fn rejected(e: TokenError) -> anyhow::Error {
    anyhow::anyhow!("rejected: {}", e.reason())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn read_line() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read secret from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
