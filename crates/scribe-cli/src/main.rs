//! Scribe CLI - Credential and token tooling
//!
//! Usage:
//!   scribe hash-password <password>
//!   scribe check-hash <password> <hash>
//!   scribe issue-token <user-id> <username> [--role admin] [--kind refresh]
//!   scribe inspect-token <token> [--kind access]
//!
//! Signing settings come from the same environment (or `SCRIBE_CONFIG` file)
//! as the server, so issued tokens are accepted by it.
//!
//! Author: hephaex@gmail.com

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use scribe_core::auth::password::validate_password_strength;
use scribe_core::config::AppConfig;
use scribe_core::{Identity, PasswordHasher, Role, SubjectId, TokenClaims, TokenCodec, TokenType};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Scribe credential and token tools")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to $SCRIBE_CONFIG, then env only)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a password with the configured Argon2 parameters
    HashPassword {
        password: String,
        /// Skip the strength check
        #[arg(long)]
        allow_weak: bool,
    },
    /// Verify a password against a stored hash
    CheckHash { password: String, hash: String },
    /// Sign a token for a user
    IssueToken {
        user_id: SubjectId,
        username: String,
        #[arg(long, default_value = "user")]
        role: Role,
        #[arg(long, value_enum, default_value_t = Kind::Access)]
        kind: Kind,
    },
    /// Decode and check a token without consulting revocations
    InspectToken {
        token: String,
        /// Also require this token type
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Access,
    Refresh,
}

impl From<Kind> for TokenType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Access => TokenType::Access,
            Kind::Refresh => TokenType::Refresh,
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let path = path.or_else(|| std::env::var_os("SCRIBE_CONFIG").map(PathBuf::from));
    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration file");
            AppConfig::from_file(path)?.with_env_override()?
        }
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::HashPassword {
            password,
            allow_weak,
        } => {
            if let Err(reason) = validate_password_strength(&password) {
                if !allow_weak {
                    bail!("{reason} (pass --allow-weak to hash anyway)");
                }
                warn!(%reason, "Hashing a weak password");
            }
            let hasher = PasswordHasher::new(config.password)?;
            println!("{}", hasher.hash(&password)?);
        }
        Commands::CheckHash { password, hash } => {
            let hasher = PasswordHasher::new(config.password)?;
            if !hasher
                .verify_detailed(&password, &hash)
                .context("stored hash is not a recognised format")?
            {
                bail!("password does not match");
            }
            println!("match");
            if hasher.needs_upgrade(&hash) {
                println!("hash uses outdated parameters and will be upgraded on next login");
            }
        }
        Commands::IssueToken {
            user_id,
            username,
            role,
            kind,
        } => {
            let codec = TokenCodec::from_config(&config.jwt)?;
            let token_type = TokenType::from(kind);
            let ttl = match token_type {
                TokenType::Access => config.jwt.access_ttl_secs(),
                TokenType::Refresh => config.jwt.refresh_ttl_secs(),
            };
            let claims = TokenClaims::new(
                &Identity::new(user_id, username, role),
                token_type,
                codec.issuer(),
                ttl,
                chrono::Utc::now().timestamp(),
            );
            println!("{}", codec.encode(&claims)?);
        }
        Commands::InspectToken { token, kind } => {
            let codec = TokenCodec::from_config(&config.jwt)?;
            let claims = codec
                .decode(token.trim(), kind.map(TokenType::from))
                .map_err(|e| anyhow::anyhow!("token rejected ({}): {e}", e.reason()))?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
            println!(
                "expires in {}s",
                claims.remaining_secs(chrono::Utc::now().timestamp())
            );
        }
    }

    Ok(())
}
