//! End-to-end tests: synthetic data → training → checkpoint → inference.

use tempfile::TempDir;
use vehicle_match::checkpoint::Checkpoint;
use vehicle_match::config_loader::TrainingConfig;
use vehicle_match::dataset::{synthetic_records, Dataset};
use vehicle_match::feature_schema::FEATURE_COUNT;
use vehicle_match::training::train_from_dataset;
use vehicle_match::{build_feature_vector, MatchError, MatchRequest, MatchService};

fn scenario_a() -> MatchRequest {
    MatchRequest {
        car_price: 25000.0,
        user_budget: 20000.0,
        car_mpg: 30.0,
        desired_mpg: 35.0,
        avg_star_rating: 4.5,
        avg_sentiment: 0.6,
        num_reviews: 50,
        prefer_new: 1.0,
        prefer_used: 0.0,
        body_sedan: 1,
        body_suv: 0,
    }
}

fn config() -> TrainingConfig {
    TrainingConfig {
        epochs: 300,
        learning_rate: 0.05,
        validation_interval: 20,
        validation_ratio: 0.2,
        seed: 42,
    }
}

/// Train a model and write its checkpoint into a fresh temp dir.
fn trained_checkpoint() -> (TempDir, std::path::PathBuf, Checkpoint) {
    let dataset = Dataset::from_records(synthetic_records(1000, 42).unwrap()).unwrap();
    let outcome = train_from_dataset(&dataset, &config()).expect("training should succeed");
    let checkpoint = Checkpoint::new(outcome.parameters, outcome.summary).unwrap();

    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("match_model.json");
    checkpoint.save(&path).expect("checkpoint should be written");
    (dir, path, checkpoint)
}

#[test]
fn trained_model_beats_chance_on_validation() {
    let (_dir, _path, checkpoint) = trained_checkpoint();
    assert_eq!(checkpoint.training.train_rows, 800);
    assert_eq!(checkpoint.training.validation_rows, 200);
    assert!(
        checkpoint.training.final_validation_accuracy > 0.75,
        "validation accuracy {}",
        checkpoint.training.final_validation_accuracy
    );
}

#[test]
fn service_scores_with_trained_checkpoint() {
    let (_dir, path, checkpoint) = trained_checkpoint();
    let service = MatchService::load(&path).expect("service should start");

    let response = service.score(&scenario_a()).unwrap();
    assert!(response.match_score > 0.0 && response.match_score < 1.0);
    assert!(response.match_score_percent <= 100);

    // Same numbers as running the frozen parameters by hand.
    let x = build_feature_vector(&scenario_a()).unwrap();
    let p = &checkpoint.parameters;
    let z = p.bias + x.as_slice().iter().zip(&p.weights).map(|(a, b)| a * b).sum::<f64>();
    let expected = 1.0 / (1.0 + (-z).exp());
    assert!((response.match_score - expected).abs() < 1e-12);
}

#[test]
fn over_budget_scores_lower_than_under_budget() {
    let (_dir, path, _) = trained_checkpoint();
    let service = MatchService::load(&path).unwrap();

    let mut cheap = scenario_a();
    cheap.car_price = 15000.0;
    let mut expensive = scenario_a();
    expensive.car_price = 45000.0;

    let cheap_score = service.score(&cheap).unwrap().match_score;
    let expensive_score = service.score(&expensive).unwrap().match_score;
    assert!(cheap_score > expensive_score);
}

#[test]
fn training_is_reproducible() {
    let dataset = Dataset::from_records(synthetic_records(500, 7).unwrap()).unwrap();
    let cfg = TrainingConfig {
        epochs: 60,
        ..config()
    };
    let a = train_from_dataset(&dataset, &cfg).unwrap();
    let b = train_from_dataset(&dataset, &cfg).unwrap();

    assert_eq!(a.history.len(), b.history.len());
    for (wa, wb) in a.parameters.weights.iter().zip(&b.parameters.weights) {
        assert!((wa - wb).abs() < 1e-6, "{wa} vs {wb}");
    }
    assert!((a.parameters.bias - b.parameters.bias).abs() < 1e-6);
}

#[test]
fn checkpoint_with_wrong_dimension_prevents_startup() {
    let (_dir, path, _) = trained_checkpoint();

    // Rewrite the file as if it came from a schema with an extra feature,
    // keeping the digest consistent so only the schema check can catch it.
    let mut ckpt = Checkpoint::load(&path).unwrap();
    ckpt.parameters.weights.push(0.5);
    ckpt.input_dim = FEATURE_COUNT + 1;
    ckpt.feature_names.push("body_truck".to_string());
    ckpt.parameters_sha256 =
        vehicle_match::checkpoint::parameters_digest(&ckpt.parameters).unwrap();
    std::fs::write(&path, ckpt.to_json().unwrap()).unwrap();

    let err = MatchService::load(&path).unwrap_err();
    assert!(matches!(err, MatchError::SchemaMismatch { .. }), "{err}");
}

#[test]
fn checkpoint_from_older_schema_prevents_startup() {
    let (_dir, path, _) = trained_checkpoint();

    let mut ckpt = Checkpoint::load(&path).unwrap();
    ckpt.schema_version = "vehicle-match-features/v0".to_string();
    std::fs::write(&path, ckpt.to_json().unwrap()).unwrap();

    assert!(matches!(
        MatchService::load(&path),
        Err(MatchError::SchemaMismatch { .. })
    ));
}

#[test]
fn degenerate_budget_scores_finitely() {
    let (_dir, path, _) = trained_checkpoint();
    let service = MatchService::load(&path).unwrap();

    let mut req = scenario_a();
    req.user_budget = 0.0;
    let response = service.score(&req).unwrap();
    assert!(response.match_score.is_finite());
    assert!(response.match_score > 0.0 && response.match_score < 1.0);
}
