use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollguard_core::detector::FaceDetector;
use rollguard_core::encoder::FaceEncoder;
use rollguard_core::extractor::{self, FaceSelection, FeatureExtractor};
use rollguard_core::matcher::{
    DEFAULT_FACE_DISTANCE_THRESHOLD, DEFAULT_SIGNATURE_SIMILARITY_THRESHOLD,
};
use rollguard_core::ssim;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rollguard", about = "Rollguard biometric matching diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in an image and print their boxes
    Detect {
        image: PathBuf,
    },
    /// Compare the faces in two images by embedding distance
    CompareFaces {
        a: PathBuf,
        b: PathBuf,
    },
    /// Compare two signature images by structural similarity
    CompareSignatures {
        a: PathBuf,
        b: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect { image } => {
            let rgb = image::open(&image)
                .with_context(|| format!("cannot open {}", image.display()))?
                .to_rgb8();
            let mut detector = FaceDetector::load(&detector_model_path())?;
            let faces = detector.detect(&rgb)?;

            if faces.is_empty() {
                println!("no faces detected");
            }
            for (i, face) in faces.iter().enumerate() {
                println!(
                    "face {i}: {:.0}x{:.0} at ({:.0}, {:.0}), confidence {:.2}",
                    face.width, face.height, face.x, face.y, face.confidence
                );
            }
        }
        Commands::CompareFaces { a, b } => {
            let detector = FaceDetector::load(&detector_model_path())?;
            let encoder = FaceEncoder::load(&encoder_model_path())?;
            let mut ext = FeatureExtractor::new(detector, encoder);

            let ea = ext.extract_face(&read(&a)?, FaceSelection::First)?;
            let eb = ext.extract_face(&read(&b)?, FaceSelection::First)?;
            let distance = ea.euclidean_distance(&eb);

            let verdict = if distance < DEFAULT_FACE_DISTANCE_THRESHOLD {
                "likely the same person"
            } else {
                "different people"
            };
            println!("distance: {distance:.4} ({verdict})");
        }
        Commands::CompareSignatures { a, b } => {
            let ra = extractor::extract_signature(&read(&a)?)?;
            let rb = extractor::extract_signature(&read(&b)?)?;
            let similarity = ssim::structural_similarity(&ra, &rb);

            let verdict = if similarity > DEFAULT_SIGNATURE_SIMILARITY_THRESHOLD {
                "likely duplicates"
            } else {
                "distinct"
            };
            println!("similarity: {similarity:.4} ({verdict})");
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

fn model_dir() -> PathBuf {
    std::env::var("ROLLGUARD_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| rollguard_core::default_model_dir())
}

fn detector_model_path() -> String {
    model_dir()
        .join(rollguard_core::DETECTOR_MODEL_FILE)
        .to_string_lossy()
        .into_owned()
}

fn encoder_model_path() -> String {
    model_dir()
        .join(rollguard_core::ENCODER_MODEL_FILE)
        .to_string_lossy()
        .into_owned()
}
