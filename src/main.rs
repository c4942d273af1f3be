use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use evidence_container::{
    container_snapshot, open_storage, Concern, MessageSink, Profile, ProfileValidator, SealedContainer,
    SigningIdentity, Storage, Topic, ValidationConfig, ValidationMessage, ValidationReport,
};

#[derive(Parser)]
#[command(name = "evidence-container", version, about = "Validate and inspect signed evidence containers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run structure, value, certificate and profile validation
    Validate {
        /// Container directory or archive file
        container: PathBuf,
        /// Profile document (defaults to the profile embedded in the container)
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Directory of trusted CA certificates
        #[arg(long)]
        ca_dir: Option<PathBuf>,
        /// Accept self-signed signer certificates
        #[arg(long)]
        allow_self_signed: bool,
        /// Validation config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the JSON report here
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write the messages as CSV here
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Print editions and entity index as JSON
    Inspect {
        container: PathBuf,
    },
    /// Create a signing identity
    Keygen {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        out: PathBuf,
        /// Issue the certificate from this CA identity instead of self-signing
        #[arg(long)]
        ca: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Validate {
            container,
            profile,
            ca_dir,
            allow_self_signed,
            config,
            report,
            csv,
        } => {
            let mut settings = match &config {
                Some(path) => ValidationConfig::load(path)?,
                None => ValidationConfig::default(),
            }
            .apply_env()?;
            if ca_dir.is_some() {
                settings.ca_directory = ca_dir;
            }
            if allow_self_signed {
                settings.rules.allow_self_signed_certificate = true;
            }

            let valid = run_validate(&container, profile.as_deref(), &settings, report.as_deref(), csv.as_deref())?;
            if !valid {
                std::process::exit(1);
            }
        }
        Command::Inspect { container } => run_inspect(&container)?,
        Command::Keygen { subject, out, ca } => run_keygen(&subject, &out, ca.as_deref())?,
    }

    Ok(())
}

fn open_existing(path: &Path) -> Result<Box<dyn Storage>> {
    if !path.exists() {
        bail!("container not found: {}", path.display());
    }
    open_storage(path).with_context(|| format!("opening {}", path.display()))
}

fn run_validate(
    path: &Path,
    profile_path: Option<&Path>,
    settings: &ValidationConfig,
    report_path: Option<&Path>,
    csv_path: Option<&Path>,
) -> Result<bool> {
    println!("🔍 Validating {}", path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let storage = open_existing(path)?;
    let mut report = ValidationReport::new(path.display().to_string());

    let opened = {
        let mut sink = report.sink(Concern::Structure);
        match SealedContainer::open(storage, &mut sink, settings.compatibility.clone()) {
            Ok(container) => Some(container),
            Err(e) => {
                sink.push(ValidationMessage::error(Topic::Structure, format!("container cannot be opened: {}", e)));
                None
            }
        }
    };

    if let Some(container) = &opened {
        if !report.attach_container(container) {
            println!("⚠️  Structure errors found; container snapshot left out of the report");
        }

        container.verify_entity_value_signatures(&mut report.sink(Concern::Value));
        container
            .validate_certificates(
                settings.ca_directory.as_deref(),
                &settings.rules,
                &mut report.sink(Concern::Certificate),
            )
            .context("certificate validation")?;

        let profile = match profile_path {
            Some(p) => Some(Profile::load(p).with_context(|| format!("loading profile {}", p.display()))?),
            None => container.embedded_profile().context("reading embedded profile")?,
        };
        let mut sink = report.sink(Concern::Profile);
        match profile {
            Some(profile) => {
                ProfileValidator::new(&profile).validate_container(container, &mut sink);
            }
            None => sink.push(ValidationMessage::success(
                Topic::Profile,
                "no profile supplied or embedded; profile validation skipped",
            )),
        }
    }

    for collection in report.collections() {
        let mark = if collection.contains_error() { "❌" } else { "✓" };
        println!(
            "{} {:<12} {} message(s), {} error(s)",
            mark,
            collection.name,
            collection.len(),
            collection.error_count()
        );
        for message in collection.iter().filter(|m| m.is_error()) {
            println!("     {}", message);
        }
    }

    if let Some(p) = report_path {
        report.write_json(p)?;
        println!("\n📄 Report written to {}", p.display());
    }
    if let Some(p) = csv_path {
        report.write_csv(p)?;
        println!("📄 CSV written to {}", p.display());
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let valid = !report.contains_error();
    if valid {
        println!("✅ Container is valid");
    } else {
        println!("❌ Container is NOT valid");
    }
    Ok(valid)
}

fn run_inspect(path: &Path) -> Result<()> {
    let storage = open_existing(path)?;
    let mut messages: Vec<ValidationMessage> = Vec::new();
    let container = SealedContainer::open(storage, &mut messages, Default::default())
        .with_context(|| format!("opening {}", path.display()))?;

    for message in messages.iter().filter(|m| m.is_error()) {
        eprintln!("⚠️  {}", message);
    }
    println!("{}", serde_json::to_string_pretty(&container_snapshot(&container))?);
    Ok(())
}

fn run_keygen(subject: &str, out: &Path, ca: Option<&Path>) -> Result<()> {
    let identity = match ca {
        Some(ca_path) => {
            let ca = SigningIdentity::load(ca_path).with_context(|| format!("loading CA {}", ca_path.display()))?;
            SigningIdentity::issued_by(&ca, subject)?
        }
        None => SigningIdentity::self_signed(subject)?,
    };
    identity.save(out)?;

    let certificate = identity.certificate();
    println!("🔑 Identity for '{}' written to {}", certificate.subject, out.display());
    println!("   issuer:      {}", certificate.issuer);
    println!("   fingerprint: {}", certificate.fingerprint());
    println!("   valid until: {}", certificate.not_after.to_rfc3339());
    Ok(())
}
