//! Stream synthetic readings for two vehicles through a nearest-centroid model

use drive_sense::{CentroidClassifier, DriveProcessor, ExtractorConfig, Reading};

const MODEL: &str = r#"{
    "model_type": "nearest_centroid",
    "feature_names": [
        "AccX_jerk", "AccY_jerk", "AccZ_jerk",
        "AccX_rolling_mean", "AccX_rolling_std",
        "AccY_rolling_mean", "AccY_rolling_std",
        "AccZ_rolling_mean", "AccZ_rolling_std"
    ],
    "classes": [
        { "label": "normal", "centroid": [0.0, 0.0, 0.0, 0.0, 0.1, 0.0, 0.1, 9.8, 0.1] },
        { "label": "aggressive", "centroid": [3.0, 3.0, 0.5, 0.0, 2.5, 0.0, 2.5, 9.8, 0.8] },
        { "label": "braking", "centroid": [-4.0, 0.0, 0.0, -2.0, 1.5, 0.0, 0.2, 9.8, 0.2] }
    ]
}"#;

fn main() {
    let classifier = match CentroidClassifier::from_json(MODEL) {
        Ok(classifier) => classifier,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };

    let processor = match DriveProcessor::with_classifier(&ExtractorConfig::with_window_size(10), classifier) {
        Ok(processor) => processor,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };

    for i in 0..20 {
        let t = i as f64;
        let calm = [0.05 * (t * 0.3).sin(), 0.02, 9.8, 0.0, 0.0, 0.01];
        let swerving = [2.5 * (t * 1.7).sin(), 2.5 * (t * 2.1).cos(), 9.8, 0.3, 0.1, 0.8];

        for (vehicle, values) in [("calm-car", calm), ("swerving-car", swerving)] {
            let verdict = Reading::from_array(values)
                .and_then(|reading| processor.process_reading(vehicle, reading))
                .and_then(|verdict| Ok(serde_json::to_string(&verdict)?));
            match verdict {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error: {e:?}"),
            }
        }
    }
}
