use std::path::PathBuf;

use clap::{Parser, Subcommand};
use contentsignaturepki::keys::SoftwareKeyProvider;
use contentsignaturepki::x5u::FilePublisher;
use contentsignaturepki::{Collaborators, ContentSigner, SignerConfig, verify};
use eyre::WrapErr;

#[derive(Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Make an end-entity under the configured issuer and sign a file with it.
    Sign {
        /// JSON signer configuration.
        #[clap(long, env = "CONTENTSIGNATURE_CONFIG")]
        config: PathBuf,
        #[clap(long)]
        input: PathBuf,
    },
    /// Verify a signature against the chain published at an x5u.
    Verify {
        #[clap(long)]
        x5u: String,
        #[clap(long)]
        signature: String,
        #[clap(long)]
        input: PathBuf,
    },
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Args::parse().command {
        Command::Sign { config, input } => {
            let config = SignerConfig::from_json_file(&config).map_err(|e| eyre::eyre!("{e:#}"))?;
            let data = std::fs::read(&input)
                .wrap_err_with(|| format!("reading {}", input.display()))?;

            let keys = SoftwareKeyProvider::new();
            let signer = ContentSigner::new(
                config,
                Collaborators {
                    keys: &keys,
                    registry: None,
                    publisher: &FilePublisher,
                    logger: None,
                },
            )?;
            let signature = signer.sign_data(&data)?;
            let output = serde_json::json!({
                "id": signature.id,
                "mode": signature.mode,
                "x5u": signature.x5u,
                "signature": signature.encode()?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Verify { x5u, signature, input } => {
            let data = std::fs::read(&input)
                .wrap_err_with(|| format!("reading {}", input.display()))?;
            verify(&FilePublisher, &x5u, &signature, &data)?;
            println!("signature is valid");
        }
    }
    Ok(())
}
