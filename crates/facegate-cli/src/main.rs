use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{
    Embedding, EyeLandmarks, FaceBox, Frame, LivenessConfig, LivenessVerdict, LivenessVerifier,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate face matching and liveness CLI")]
struct Cli {
    /// Talk to the daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run passive liveness checks on an image file (local, no daemon)
    Check {
        /// Image file (PNG, JPEG, ...)
        image: PathBuf,
        /// Face box as top,right,bottom,left; enables the glare check
        #[arg(long, value_parser = parse_face_box)]
        face_box: Option<FaceBox>,
    },
    /// Enroll an identity from a JSON file of embeddings
    Enroll {
        /// Stable identity identifier
        #[arg(long)]
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// JSON array of embeddings (arrays of numbers)
        embeddings: PathBuf,
    },
    /// Match a probe embedding against enrolled identities
    Match {
        /// JSON array holding the probe embedding
        probe: PathBuf,
        /// Distance threshold (defaults to the daemon's setting)
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Check a landmark sequence for a blink
    Blink {
        /// JSON array of per-frame lists of eye landmarks
        landmarks: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity
    Remove {
        /// Identity ID to remove
        id: String,
    },
    /// Show daemon status
    Status,
}

// D-Bus proxy — `#[zbus::proxy]` generates `FacegateProxy` (async).
#[zbus::proxy(
    interface = "org.facegate.Facegate1",
    default_service = "org.facegate.Facegate1",
    default_path = "/org/facegate/Facegate1"
)]
trait Facegate {
    async fn enroll(&self, id: &str, name: &str, embeddings_json: &str) -> zbus::Result<u32>;
    async fn match_probe(&self, probe_json: &str, threshold: f64) -> zbus::Result<String>;
    async fn verify_active(&self, landmarks_json: &str) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn remove_identity(&self, id: &str) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Check { image, face_box } = &cli.command {
        let verdict = check_image(image, face_box.as_ref())?;
        print_verdict(&verdict)?;
        if !verdict.passed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let conn = if cli.session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = FacegateProxy::new(&conn)
        .await
        .context("facegated is not reachable")?;

    match cli.command {
        Commands::Check { .. } => {}
        Commands::Enroll {
            id,
            name,
            embeddings,
        } => {
            let json = read_json::<Vec<Embedding>>(&embeddings)?;
            let stored = proxy.enroll(&id, &name, &json).await?;
            println!("Enrolled '{id}' ({name}) with {stored} template(s)");
        }
        Commands::Match { probe, threshold } => {
            let json = read_json::<Embedding>(&probe)?;
            let reply = proxy.match_probe(&json, threshold.unwrap_or(0.0)).await?;
            print_json(&reply)?;
        }
        Commands::Blink { landmarks } => {
            let json = read_json::<Vec<Vec<EyeLandmarks>>>(&landmarks)?;
            let reply = proxy.verify_active(&json).await?;
            let verdict: LivenessVerdict = serde_json::from_str(&reply)?;
            print_verdict(&verdict)?;
            if !verdict.passed {
                std::process::exit(1);
            }
        }
        Commands::List => {
            let reply = proxy.list_identities().await?;
            let identities: Vec<serde_json::Value> = serde_json::from_str(&reply)?;
            if identities.is_empty() {
                println!("No identities enrolled");
            } else {
                for identity in identities {
                    println!(
                        "{}\t{}\t{} template(s)\t{}",
                        identity["id"].as_str().unwrap_or("?"),
                        identity["name"].as_str().unwrap_or("?"),
                        identity["templates"],
                        identity["created_at"].as_str().unwrap_or("?"),
                    );
                }
            }
        }
        Commands::Remove { id } => {
            if proxy.remove_identity(&id).await? {
                println!("Removed identity: {id}");
            } else {
                bail!("no identity with id '{id}'");
            }
        }
        Commands::Status => {
            let reply = proxy.status().await?;
            print_json(&reply)?;
        }
    }

    Ok(())
}

/// Decode an image and run the passive checks with default thresholds.
fn check_image(path: &Path, face_box: Option<&FaceBox>) -> Result<LivenessVerdict> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let frame = Frame::decode(&bytes)?;
    tracing::debug!(width = frame.width(), height = frame.height(), "image decoded");
    let verifier = LivenessVerifier::new(LivenessConfig::default());
    Ok(verifier.verify_passive(&frame, face_box)?)
}

/// Read a JSON file, validate it against `T`, and return the raw text.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str::<T>(&text)
        .with_context(|| format!("{} has an unexpected shape", path.display()))?;
    Ok(text)
}

fn print_json(reply: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(reply)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_verdict(verdict: &LivenessVerdict) -> Result<()> {
    let status = if verdict.passed { "PASS" } else { "FAIL" };
    println!("{status}: {}", verdict.reason);
    for score in &verdict.scores {
        println!(
            "  {:<10} {:>12.4}  {}",
            score.check.name(),
            score.score,
            if score.passed { "ok" } else { "fail" }
        );
    }
    Ok(())
}

fn parse_face_box(s: &str) -> Result<FaceBox, String> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid face box '{s}': {e}"))?;
    match parts.as_slice() {
        &[top, right, bottom, left] => {
            if bottom <= top || right <= left {
                return Err(format!("face box '{s}' has no area"));
            }
            Ok(FaceBox::new(top, right, bottom, left))
        }
        _ => Err(format!(
            "face box needs 4 values (top,right,bottom,left), got {}",
            parts.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_face_box() {
        let face = parse_face_box("10, 90,80,20").unwrap();
        assert_eq!(face, FaceBox::new(10, 90, 80, 20));
    }

    #[test]
    fn test_parse_face_box_rejects_bad_input() {
        assert!(parse_face_box("1,2,3").is_err());
        assert!(parse_face_box("a,b,c,d").is_err());
        assert!(parse_face_box("50,10,40,20").is_err());
    }

    #[test]
    fn test_cli_parses_match_threshold() {
        let cli = Cli::try_parse_from(["facegate", "match", "probe.json", "-t", "0.5"]).unwrap();
        match cli.command {
            Commands::Match { probe, threshold } => {
                assert_eq!(probe, PathBuf::from("probe.json"));
                assert_eq!(threshold, Some(0.5));
            }
            _ => panic!("expected match command"),
        }
    }

    #[test]
    fn test_cli_parses_check_face_box() {
        let cli = Cli::try_parse_from(["facegate", "check", "img.png", "--face-box", "0,40,40,0"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Check {
                face_box: Some(_),
                ..
            }
        ));
    }
}
