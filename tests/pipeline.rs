//! End-to-end tests over the full project pipeline: label indexing,
//! batching, training, artifact persistence and prediction.

use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};

use trellis_nn::{
    predict, run_training, BatchSource, DataKind, HashingTextEncoder, IoSpec, LayerKind,
    LayerParams, LayerSpec, Network, Prediction, ProjectConfig, Tensor,
};

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trellis-pipeline-{}-{}", std::process::id(), tag));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn io(kind: DataKind) -> Option<IoSpec> {
    Some(IoSpec { kind, size: None })
}

/// A project whose samples are the labels themselves: input and output are
/// both categorical, so the network only has to learn the identity map.
fn identity_project(name: &str, data_path: &Path, epochs: usize) -> ProjectConfig {
    let mut config = ProjectConfig::default_for(name);
    config.hidden_layers = vec![LayerSpec {
        size: vec![16],
        kind: LayerKind::Dense,
        config: None,
    }];
    config.input = io(DataKind::Categorical);
    config.output = io(DataKind::Categorical);
    config.training_data_path = Some(data_path.to_path_buf());
    config.epochs = epochs;
    config
}

#[test]
fn categorical_training_produces_a_predicting_artifact() {
    let dir = scratch_dir("categorical");
    let data_path = dir.join("labels.json");
    fs::write(
        &data_path,
        r#"{"red": "red", "green": "green", "blue": "blue"}"#,
    )
    .unwrap();

    let config = identity_project("colors", &data_path, 150);
    let encoder = HashingTextEncoder::default();
    let artifact = run_training(&config, &dir, &encoder).unwrap();

    assert_eq!(artifact.num_classes, 3);
    assert_eq!(artifact.epochs_run, 150);
    assert!(artifact.final_loss.is_finite());
    assert!(artifact.model_path.exists(), "artifact file should be saved");

    let history = &artifact.history;
    assert!(
        history.first().unwrap().train_loss > history.last().unwrap().train_loss,
        "training should reduce loss: first {:.6}, last {:.6}",
        history.first().unwrap().train_loss,
        history.last().unwrap().train_loss
    );

    // The artifact predicts a label from the index, and does so stably.
    let labels = ["red", "green", "blue"];
    let first = predict(&config, &dir, "red", &encoder).unwrap();
    match &first {
        Prediction::Label(label) => assert!(labels.contains(&label.as_str())),
        other => panic!("expected a label, got {}", other),
    }
    let second = predict(&config, &dir, "red", &encoder).unwrap();
    assert_eq!(second, first, "prediction should be deterministic");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn grayscale_image_pipeline_trains_and_predicts() {
    let dir = scratch_dir("grayscale");

    // Two intensity families, three 8x8 images each.
    let mut index = serde_json::Map::new();
    for (i, value) in [10u8, 30, 50, 200, 220, 240].iter().enumerate() {
        let name = format!("img{}.png", i);
        let image = GrayImage::from_pixel(8, 8, Luma([*value]));
        image.save(dir.join(&name)).unwrap();
        let label = if *value < 128 { "dark" } else { "light" };
        index.insert(name, serde_json::Value::String(label.to_string()));
    }
    let data_path = dir.join("labels.json");
    fs::write(&data_path, serde_json::Value::Object(index).to_string()).unwrap();

    // Batches resolve image paths relative to the index file.
    let encoder = HashingTextEncoder::default();
    let batches = BatchSource::new(&data_path, DataKind::GrayscaleImage, 4, &encoder).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches.sample_count(), 6);
    assert_eq!(batches.num_classes(), 2);
    let (inputs, targets) = batches.get(0).unwrap();
    assert_eq!(inputs.shape, vec![4, 8, 8, 1]);
    assert_eq!(targets.shape, vec![4, 2]);
    assert!(inputs.data.iter().all(|v| (0.0..=1.0).contains(v)));

    let mut config = ProjectConfig::default_for("shades");
    config.hidden_layers = vec![
        LayerSpec {
            size: vec![3, 3],
            kind: LayerKind::Convolution,
            config: Some(LayerParams {
                filters: Some(2),
                activation: Some("ReLU".to_string()),
                ..LayerParams::default()
            }),
        },
        LayerSpec {
            size: vec![2, 2],
            kind: LayerKind::Pooling,
            config: None,
        },
        LayerSpec {
            size: vec![8],
            kind: LayerKind::Dense,
            config: None,
        },
    ];
    config.input = io(DataKind::GrayscaleImage);
    config.output = io(DataKind::Categorical);
    config.training_data_path = Some(data_path.clone());
    config.epochs = 3;

    let artifact = run_training(&config, &dir, &encoder).unwrap();
    assert!(artifact.model_path.exists());
    assert_eq!(artifact.num_classes, 2);

    // Prediction samples arrive as full paths, unlike index entries.
    let sample = dir.join("img0.png");
    match predict(&config, &dir, &sample.to_string_lossy(), &encoder).unwrap() {
        Prediction::Label(label) => {
            assert!(label == "dark" || label == "light", "got '{}'", label)
        }
        other => panic!("expected a label, got {}", other),
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn saved_artifact_reloads_and_answers_like_the_original() {
    let dir = scratch_dir("reload");
    let data_path = dir.join("labels.json");
    fs::write(&data_path, r#"{"yes": "yes", "no": "no"}"#).unwrap();

    let config = identity_project("gate", &data_path, 40);
    let encoder = HashingTextEncoder::default();
    let artifact = run_training(&config, &dir, &encoder).unwrap();

    let network = Network::load_json(&artifact.model_path).unwrap();
    assert_eq!(network.num_classes, 2);
    let meta = network.metadata.as_ref().unwrap();
    assert_eq!(
        meta.class_labels.as_deref(),
        Some(&["no".to_string(), "yes".to_string()][..])
    );

    // A forward pass through the reloaded network is a distribution.
    let sample = Tensor::from_vec(vec![1.0, 0.0]);
    let batch = Tensor::stack(&[sample]);
    let probs = network.forward_batch(&batch).subtensor(0);
    assert_eq!(probs.len(), 2);
    let sum: f64 = probs.data.iter().sum();
    assert!((sum - 1.0).abs() < 1e-9);

    // predict() reloads from disk each call, so it matches the live network.
    let direct = network.forward(&Tensor::from_vec(vec![0.0, 1.0]));
    match predict(&config, &dir, "yes", &encoder).unwrap() {
        Prediction::Label(label) => {
            let winner = direct.argmax();
            let expected = ["no", "yes"][winner];
            assert_eq!(label, expected);
        }
        other => panic!("expected a label, got {}", other),
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn config_lifecycle_round_trips_through_disk() {
    let dir = scratch_dir("config");
    let path = dir.join("config.json");

    let mut config = ProjectConfig::default_for("drafts");
    config.input = io(DataKind::ColorImage);
    config.output = io(DataKind::Categorical);
    config.training_data_path = Some(dir.join("labels.json"));
    config.save_json(&path).unwrap();

    let loaded = ProjectConfig::load_json(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(loaded.validate().is_ok());

    fs::remove_dir_all(&dir).ok();
}
