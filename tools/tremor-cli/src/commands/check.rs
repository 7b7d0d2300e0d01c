//! Check external tools and models.

use tremor_capture::video::command_exists;
use tremor_capture::SidecarLandmarkModel;
use tremor_common::AppConfig;
use tremor_processing::features::FEATURE_SET;
use tremor_processing::{ForestClassifier, TremorClassifier};
use tremor_store::FileStore;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Tremor System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;

    for tool in ["ffmpeg", "ffprobe"] {
        if command_exists(tool) {
            println!("[OK] {tool} found");
        } else {
            println!("[FAIL] {tool} not found on PATH");
            all_ok = false;
        }
    }

    let model_path = &config.models.classifier_path;
    match ForestClassifier::load(model_path) {
        Ok(classifier) if classifier.feature_set() == FEATURE_SET => {
            println!(
                "[OK] Classifier {} ({} trees, {} classes)",
                classifier.model_version(),
                classifier.tree_count(),
                classifier.classes().len()
            );
            for (name, weight) in classifier.top_features(3) {
                println!("     {name}: {weight:.3}");
            }
        }
        Ok(classifier) => {
            println!(
                "[FAIL] Classifier uses feature set '{}', expected '{FEATURE_SET}'",
                classifier.feature_set()
            );
            all_ok = false;
        }
        Err(e) => {
            println!("[FAIL] Classifier at {}: {e}", model_path.display());
            all_ok = false;
        }
    }

    match SidecarLandmarkModel::new(config.models.landmarker.clone()) {
        Ok(model) if model.is_available() => {
            println!("[OK] Landmark helper: {}", model.config().command);
        }
        Ok(model) => {
            println!("[FAIL] Landmark helper not found: {}", model.config().command);
            all_ok = false;
        }
        Err(e) => {
            println!("[FAIL] Landmark helper: {e}");
            all_ok = false;
        }
    }

    match FileStore::open(config.store_dir()) {
        Ok(store) => println!("[OK] Result store: {}", store.root().display()),
        Err(e) => {
            println!("[FAIL] Result store: {e}");
            all_ok = false;
        }
    }

    println!();
    if all_ok {
        println!("All checks passed. Tremor is ready.");
    } else {
        println!("Some checks failed. See above for details.");
    }

    Ok(())
}
