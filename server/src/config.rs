//! Command-line and environment configuration.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Args, Parser, Subcommand};
use keygate_license::{ResponseSigner, TrialPolicy, DEFAULT_TRIAL_PREFIX, MAX_TRIAL_MINUTES};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    net::SocketAddr,
    path::PathBuf,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "keygate-server")]
#[command(about = "Keygate license activation service")]
pub struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP activation endpoint
    Serve(ServeArgs),
    /// Generate an Ed25519 signing key (PKCS#8 PEM)
    Keygen(KeygenArgs),
    /// Insert license codes into the store
    Seed(SeedArgs),
    /// Print the stored record for a code
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// SQLite database: a path, sqlite://path, or :memory:
    #[arg(long, env = "KEYGATE_DATABASE_URL")]
    pub database_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// PKCS#8 PEM private key used to sign responses
    #[arg(
        long,
        env = "KEYGATE_SIGNING_KEY",
        hide_env_values = true,
        allow_hyphen_values = true,
        conflicts_with = "signing_key_file"
    )]
    pub signing_key: Option<String>,

    /// File holding the PKCS#8 PEM private key
    #[arg(long, env = "KEYGATE_SIGNING_KEY_FILE")]
    pub signing_key_file: Option<PathBuf>,

    /// Address for the HTTP listener
    #[arg(long, env = "KEYGATE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Trial length in minutes, counted from first activation
    #[arg(long, env = "KEYGATE_TRIAL_MINUTES", default_value_t = 10,
          value_parser = clap::value_parser!(i64).range(1..=MAX_TRIAL_MINUTES))]
    pub trial_minutes: i64,

    /// Code prefix that marks trial codes; empty to rely on the stored flag only
    #[arg(long, env = "KEYGATE_TRIAL_PREFIX", default_value = DEFAULT_TRIAL_PREFIX)]
    pub trial_prefix: String,
}

impl ServeArgs {
    /// Loads the response signer.
    ///
    /// A missing key is a configuration error that degrades signatures to
    /// null; a key that is present but unreadable aborts startup.
    pub fn load_signer(&self) -> Result<ResponseSigner> {
        let pem = match (&self.signing_key, &self.signing_key_file) {
            (Some(pem), _) => pem.clone(),
            (None, Some(path)) => fs::read_to_string(path)
                .with_context(|| format!("Failed to read signing key {}", path.display()))?,
            (None, None) => {
                warn!(
                    "configuration error: no signing key configured, \
                     responses will carry a null signature"
                );
                return Ok(ResponseSigner::disabled());
            }
        };
        let signer = ResponseSigner::from_pkcs8_pem(&pem).context("Failed to parse signing key")?;
        if let Some(verifier) = signer.verifier() {
            info!(public_key = %BASE64.encode(verifier.to_bytes()), "response signing enabled");
        }
        Ok(signer)
    }

    pub fn trial_policy(&self) -> TrialPolicy {
        TrialPolicy::new(self.trial_minutes, Some(self.trial_prefix.as_str()))
    }
}

#[derive(Args, Debug, Clone)]
pub struct KeygenArgs {
    /// Where to write the private key
    #[arg(short, long, default_value = "keygate-signing.pem")]
    pub out: PathBuf,

    /// Overwrite an existing key file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Tag the codes as trials at issuance
    #[arg(long)]
    pub trial: bool,

    /// Codes to insert
    #[arg(required = true)]
    pub codes: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Code to look up
    pub code: String,
}

impl KeygenArgs {
    /// Writes the private key PEM to `out`, readable by the owner only.
    pub fn write_key(&self, pem: &str) -> Result<()> {
        if self.out.exists() && !self.force {
            bail!("{} already exists (use --force to overwrite)", self.out.display());
        }
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts
            .open(&self.out)
            .with_context(|| format!("Failed to open {}", self.out.display()))?;
        // mode() only applies on creation; tighten an overwritten file too.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(pem.as_bytes())
            .with_context(|| format!("Failed to write {}", self.out.display()))?;
        Ok(())
    }
}
