//! End-to-end training behavior through the public API.

use canopy::config::{Ensemble, Task, TrainingConfig};
use canopy::data::{Column, Dataset};
use canopy::model::{LeafValue, NodeKind};
use canopy::training::{ForestTrainer, TrainError, TrainSession, TrainingStatus};

fn regression_dataset(n: usize) -> Dataset {
    let x1: Vec<f32> = (0..n).map(|i| ((i * 37) % 101) as f32).collect();
    let x2: Vec<f32> = (0..n).map(|i| ((i * 53) % 89) as f32).collect();
    let y: Vec<f32> = x1.iter().zip(&x2).map(|(a, b)| 2.0 * a - b + 30.0).collect();
    Dataset::builder()
        .column(Column::numerical("x1", x1))
        .column(Column::numerical("x2", x2))
        .column(Column::numerical("y", y))
        .label("y")
        .build()
        .unwrap()
}

fn rmse(preds: &[f32], targets: &[f32]) -> f64 {
    let sum: f64 = preds
        .iter()
        .zip(targets)
        .map(|(p, t)| ((p - t) as f64).powi(2))
        .sum();
    (sum / targets.len() as f64).sqrt()
}

#[test]
fn same_config_same_model_across_thread_counts() {
    let dataset = regression_dataset(300);
    let mut config = TrainingConfig::bagging(Task::Regression, "y");
    config.num_trees = 8;
    config.tree.max_depth = 4;
    config.seed = 9;

    let mut single = config.clone();
    single.deployment.num_threads = Some(1);
    let mut multi = config;
    multi.deployment.num_threads = Some(4);

    let a = ForestTrainer::new(single).unwrap().train(&dataset).unwrap();
    let b = ForestTrainer::new(multi).unwrap().train(&dataset).unwrap();

    assert_eq!(a.status, TrainingStatus::Completed);
    assert_eq!(a.model, b.model);
}

#[test]
fn depth_one_stump_leaf_means_bracket_global_mean() {
    let n = 64;
    let x: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let y: Vec<f32> = x.iter().map(|v| v * 3.0 + 5.0).collect();
    let mean = y.iter().sum::<f32>() / n as f32;
    let dataset = Dataset::builder()
        .column(Column::numerical("x", x))
        .column(Column::numerical("y", y))
        .label("y")
        .build()
        .unwrap();

    let mut config = TrainingConfig::bagging(Task::Regression, "y");
    config.num_trees = 1;
    config.tree.max_depth = 1;
    config.ensemble = Ensemble::Bagging(canopy::config::BaggingParams {
        bootstrap: false,
        examples_ratio: 1.0,
    });
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    let tree = &output.model.trees()[0];
    assert_eq!(tree.num_nodes(), 3);
    assert_eq!(tree.node(0).num_examples, n as u32);

    let mut leaves = Vec::new();
    for node in tree.nodes() {
        if let NodeKind::Leaf { value: LeafValue::Scalar(v) } = &node.kind {
            leaves.push(*v);
        }
    }
    leaves.sort_by(f32::total_cmp);
    assert_eq!(leaves.len(), 2);
    assert!(leaves[0] < mean && mean < leaves[1]);
}

#[test]
fn cancellation_keeps_exactly_the_completed_trees() {
    let dataset = regression_dataset(120);
    let mut config = TrainingConfig::bagging(Task::Regression, "y");
    config.num_trees = 50;
    config.tree.max_depth = 3;
    config.deployment.num_threads = Some(1);

    let session = TrainSession::default();
    let token = session.cancel.clone();
    let session = TrainSession {
        on_tree_complete: Some(Box::new(move |done, _| {
            if done == 10 {
                token.cancel();
            }
        })),
        ..session
    };

    let output = ForestTrainer::new(config)
        .unwrap()
        .train_with(&dataset, &session)
        .unwrap();
    assert_eq!(output.status, TrainingStatus::Cancelled);
    assert_eq!(output.model.num_trees(), 10);
}

#[test]
fn cancellation_is_an_error_when_partials_are_rejected() {
    let dataset = regression_dataset(120);
    let mut config = TrainingConfig::bagging(Task::Regression, "y");
    config.num_trees = 50;
    config.tree.max_depth = 3;
    config.deployment.num_threads = Some(1);

    let session = TrainSession::default();
    let token = session.cancel.clone();
    let session = TrainSession {
        keep_partial_on_cancel: false,
        on_tree_complete: Some(Box::new(move |done, _| {
            if done == 5 {
                token.cancel();
            }
        })),
        ..session
    };

    let result = ForestTrainer::new(config)
        .unwrap()
        .train_with(&dataset, &session);
    assert!(matches!(result, Err(TrainError::Cancelled)));
}

#[test]
fn early_stopping_truncates_to_the_best_round() {
    // Constant labels: the base score is already optimal, every boosted
    // tree is a zero leaf and the validation metric never improves past
    // round zero.
    let constant = |n: usize| {
        Dataset::builder()
            .column(Column::numerical("x", (0..n).map(|i| i as f32).collect()))
            .column(Column::numerical("y", vec![5.0; n]))
            .label("y")
            .build()
            .unwrap()
    };
    let train = constant(40);
    let valid = constant(10);

    let mut config = TrainingConfig::boosting(Task::Regression, "y");
    config.num_trees = 20;
    config.early_stopping_rounds = 3;
    config.deployment.num_threads = Some(1);

    let session = TrainSession::default().with_valid(&valid);
    let output = ForestTrainer::new(config)
        .unwrap()
        .train_with(&train, &session)
        .unwrap();
    assert_eq!(output.status, TrainingStatus::EarlyStopped { best_round: 0 });
    assert_eq!(output.model.num_trees(), 1);
}

#[test]
fn early_stopping_without_validation_warns_and_completes() {
    let dataset = regression_dataset(60);
    let mut config = TrainingConfig::bagging(Task::Regression, "y");
    config.num_trees = 3;
    config.early_stopping_rounds = 2;
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    assert_eq!(output.status, TrainingStatus::Completed);
    assert_eq!(output.model.num_trees(), 3);
    assert!(output
        .warnings
        .iter()
        .any(|w| w.contains("no validation data")));
}

#[test]
fn child_example_counts_partition_their_parent() {
    let dataset = regression_dataset(200);
    let mut config = TrainingConfig::bagging(Task::Regression, "y");
    config.num_trees = 5;
    config.tree.max_depth = 6;
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    for tree in output.model.trees() {
        // Bootstrap draws exactly `n` examples per tree.
        assert_eq!(tree.node(0).num_examples, 200);
        for node in tree.nodes() {
            if let NodeKind::Internal { left, right, .. } = &node.kind {
                assert_eq!(
                    tree.node(*left).num_examples + tree.node(*right).num_examples,
                    node.num_examples
                );
            }
        }
    }
}

#[test]
fn boosting_beats_the_constant_predictor() {
    let dataset = regression_dataset(250);
    let targets: Vec<f32> = dataset.label_column().as_numerical().unwrap().to_vec();
    let mean = targets.iter().sum::<f32>() / targets.len() as f32;
    let baseline = rmse(&vec![mean; targets.len()], &targets);

    let mut config = TrainingConfig::boosting(Task::Regression, "y");
    config.num_trees = 20;
    config.tree.max_depth = 4;
    config.deployment.num_threads = Some(1);
    if let Ensemble::Boosting(params) = &mut config.ensemble {
        params.learning_rate = 0.3;
    }

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    let trained = rmse(&output.model.predict(&dataset), &targets);
    assert!(trained < baseline * 0.5, "rmse {trained} vs baseline {baseline}");
}

#[test]
fn more_bagged_trees_do_not_degrade_training_fit() {
    let dataset = regression_dataset(250);
    let targets: Vec<f32> = dataset.label_column().as_numerical().unwrap().to_vec();

    let train = |num_trees: u32| {
        let mut config = TrainingConfig::bagging(Task::Regression, "y");
        config.num_trees = num_trees;
        config.tree.max_depth = 6;
        config.deployment.num_threads = Some(1);
        let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
        rmse(&output.model.predict(&dataset), &targets)
    };

    let mean = targets.iter().sum::<f32>() / targets.len() as f32;
    let baseline = rmse(&vec![mean; targets.len()], &targets);
    let few = train(2);
    let many = train(25);

    assert!(many < baseline, "forest rmse {many} vs constant {baseline}");
    // Averaging over more bootstrap trees must not hurt beyond noise.
    assert!(many <= few * 1.25, "rmse grew from {few} to {many}");
}

#[test]
fn classification_recovers_separable_labels() {
    let n = 20;
    let x: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let tokens: Vec<Option<&str>> = (0..n).map(|i| Some(if i < 10 { "a" } else { "b" })).collect();
    let dataset = Dataset::builder()
        .column(Column::numerical("x", x))
        .column(Column::categorical_from_tokens("y", &tokens, 1, -1))
        .label("y")
        .build()
        .unwrap();

    let mut config = TrainingConfig::bagging(Task::Classification, "y");
    config.num_trees = 5;
    config.ensemble = Ensemble::Bagging(canopy::config::BaggingParams {
        bootstrap: false,
        examples_ratio: 1.0,
    });
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    // Vocabulary: OOV, then "a" and "b" (equal frequency, token order).
    assert_eq!(output.model.classes(), &["<OOV>", "a", "b"]);
    for example in 0..n {
        let expected = if example < 10 { 1 } else { 2 };
        assert_eq!(output.model.predict_class_row(&dataset, example), expected);
        let dist = output.model.predict_distribution_row(&dataset, example);
        assert!(dist[expected as usize] > 0.5);
    }
}

#[test]
fn ranking_orders_examples_within_groups() {
    // Two groups with disjoint label offsets; only the within-group
    // ordering (driven by x) is learnable signal.
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut group = Vec::new();
    for (key, offset) in [(1u64, 0.0f32), (2u64, 100.0f32)] {
        for i in 0..10 {
            x.push(i as f32);
            y.push(offset + i as f32);
            group.push(key);
        }
    }
    let dataset = Dataset::builder()
        .column(Column::numerical("x", x))
        .column(Column::hash("q", group))
        .column(Column::numerical("y", y))
        .label("y")
        .ranking_group("q")
        .build()
        .unwrap();

    let mut config = TrainingConfig::bagging(Task::Ranking, "y").with_ranking_group("q");
    config.num_trees = 5;
    config.tree.min_examples_per_leaf = 2;
    config.ensemble = Ensemble::Bagging(canopy::config::BaggingParams {
        bootstrap: false,
        examples_ratio: 1.0,
    });
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    // Rows 0/9 are the extremes of group 1, rows 10/19 of group 2.
    assert!(output.model.predict_row(&dataset, 9) > output.model.predict_row(&dataset, 0));
    assert!(output.model.predict_row(&dataset, 19) > output.model.predict_row(&dataset, 10));
}

#[test]
fn uplift_effect_is_localized_to_the_responsive_segment() {
    // Treatment shifts the outcome by 2 only where x == 1.
    let n = 32;
    let mut x = Vec::new();
    let mut outcome = Vec::new();
    let mut treated = Vec::new();
    for i in 0..n {
        let segment = (i / 16) as f32; // 0 or 1
        let arm = i % 2 == 0;
        x.push(segment);
        treated.push(Some(arm));
        outcome.push(if arm && segment == 1.0 { 2.0 } else { 0.0 });
    }
    let dataset = Dataset::builder()
        .column(Column::numerical("x", x))
        .column(Column::boolean("t", &treated))
        .column(Column::numerical("y", outcome))
        .label("y")
        .uplift_treatment("t")
        .build()
        .unwrap();

    let mut config =
        TrainingConfig::bagging(Task::NumericalUplift, "y").with_uplift_treatment("t");
    config.num_trees = 3;
    config.ensemble = Ensemble::Bagging(canopy::config::BaggingParams {
        bootstrap: false,
        examples_ratio: 1.0,
    });
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    // Example 0 sits in the unresponsive segment, example 31 in the
    // responsive one.
    assert!(output.model.predict_row(&dataset, 0) < 0.5);
    assert!(output.model.predict_row(&dataset, 31) > 1.0);
}

#[test]
fn categorical_uplift_recovers_per_class_effects() {
    // Treatment flips the outcome from "no" to "yes", but only in the
    // x == 1 segment.
    let n = 40;
    let mut x = Vec::new();
    let mut outcome = Vec::new();
    let mut treated = Vec::new();
    for i in 0..n {
        let segment = (i / 20) as f32; // 0 or 1
        let arm = i % 2 == 0;
        x.push(segment);
        treated.push(Some(arm));
        outcome.push(Some(if arm && segment == 1.0 { "yes" } else { "no" }));
    }
    let dataset = Dataset::builder()
        .column(Column::numerical("x", x))
        .column(Column::boolean("t", &treated))
        .column(Column::categorical_from_tokens("y", &outcome, 1, -1))
        .label("y")
        .uplift_treatment("t")
        .build()
        .unwrap();

    let mut config =
        TrainingConfig::bagging(Task::CategoricalUplift, "y").with_uplift_treatment("t");
    config.num_trees = 3;
    config.ensemble = Ensemble::Bagging(canopy::config::BaggingParams {
        bootstrap: false,
        examples_ratio: 1.0,
    });
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    // "no" outnumbers "yes", so codes are OOV=0, "no"=1, "yes"=2.
    assert_eq!(output.model.classes(), &["<OOV>", "no", "yes"]);

    // Responsive segment: treatment moves all mass from "no" to "yes".
    let responsive = output.model.predict_distribution_row(&dataset, (n - 1) as usize);
    assert!((responsive[1] + 1.0).abs() < 1e-5, "effect on \"no\" was {}", responsive[1]);
    assert!((responsive[2] - 1.0).abs() < 1e-5, "effect on \"yes\" was {}", responsive[2]);

    // Unresponsive segment: no effect on any class.
    let flat = output.model.predict_distribution_row(&dataset, 0);
    for effect in &flat {
        assert!(effect.abs() < 1e-5, "expected zero effect, got {effect}");
    }
}

#[test]
fn uplift_ignores_validation_data_with_a_warning() {
    let outcomes = vec![0.0, 1.0, 0.0, 2.0, 0.0, 1.5, 0.5, 2.0];
    let treated: Vec<Option<bool>> = (0..8).map(|i| Some(i % 2 == 1)).collect();
    let build = || {
        Dataset::builder()
            .column(Column::numerical("x", (0..8).map(|i| i as f32).collect()))
            .column(Column::boolean("t", &treated))
            .column(Column::numerical("y", outcomes.clone()))
            .label("y")
            .uplift_treatment("t")
            .build()
            .unwrap()
    };
    let train = build();
    let valid = build();

    let mut config =
        TrainingConfig::bagging(Task::NumericalUplift, "y").with_uplift_treatment("t");
    config.num_trees = 2;
    config.tree.min_examples_per_leaf = 1;
    config.deployment.num_threads = Some(1);

    let session = TrainSession::default().with_valid(&valid);
    let output = ForestTrainer::new(config)
        .unwrap()
        .train_with(&train, &session)
        .unwrap();
    assert!(output.warnings.iter().any(|w| w.contains("ignored")));
}

#[test]
fn config_dataset_mismatches_are_config_errors() {
    let dataset = regression_dataset(20);

    // A weight column the dataset does not carry.
    let config = TrainingConfig::bagging(Task::Regression, "y").with_weights("w");
    let err = ForestTrainer::new(config).unwrap().train(&dataset).unwrap_err();
    assert!(matches!(err, TrainError::Config(_)));

    // A categorical task over a numerical label.
    let config = TrainingConfig::bagging(Task::Classification, "y");
    let err = ForestTrainer::new(config).unwrap().train(&dataset).unwrap_err();
    assert!(matches!(err, TrainError::Config(_)));
}

#[test]
fn dataset_side_group_binding_needs_a_ranking_config() {
    let dataset = Dataset::builder()
        .column(Column::numerical("x", vec![1.0, 2.0, 3.0, 4.0]))
        .column(Column::hash("q", vec![1, 1, 2, 2]))
        .column(Column::numerical("y", vec![0.0, 1.0, 2.0, 3.0]))
        .label("y")
        .ranking_group("q")
        .build()
        .unwrap();

    let config = TrainingConfig::bagging(Task::Regression, "y");
    let err = ForestTrainer::new(config).unwrap().train(&dataset).unwrap_err();
    assert!(matches!(err, TrainError::Config(_)));
}

#[test]
fn boosting_classification_requires_a_binary_label() {
    let tokens: Vec<Option<&str>> = (0..12)
        .map(|i| Some(["a", "b", "c"][i % 3]))
        .collect();
    let dataset = Dataset::builder()
        .column(Column::numerical("x", (0..12).map(|i| i as f32).collect()))
        .column(Column::categorical_from_tokens("y", &tokens, 1, -1))
        .label("y")
        .build()
        .unwrap();

    let config = TrainingConfig::boosting(Task::Classification, "y");
    let err = ForestTrainer::new(config).unwrap().train(&dataset).unwrap_err();
    assert!(matches!(err, TrainError::Config(_)));
}

#[test]
fn boosting_separates_binary_classes() {
    let n = 40;
    let x: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let tokens: Vec<Option<&str>> =
        (0..n).map(|i| Some(if i < n / 2 { "neg" } else { "pos" })).collect();
    let dataset = Dataset::builder()
        .column(Column::numerical("x", x))
        .column(Column::categorical_from_tokens("y", &tokens, 1, -1))
        .label("y")
        .build()
        .unwrap();

    let mut config = TrainingConfig::boosting(Task::Classification, "y");
    config.num_trees = 10;
    config.tree.max_depth = 2;
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    // "neg" < "pos" in the vocabulary, so "pos" carries the higher code.
    for example in 0..n {
        let expected = if example < n / 2 { 1 } else { 2 };
        assert_eq!(output.model.predict_class_row(&dataset, example), expected);
    }
}

#[test]
fn weighted_examples_dominate_leaf_values() {
    // Two clusters of equal size; weights make the second cluster dominate
    // the root leaf of a depth-limited tree.
    let y = vec![0.0f32, 0.0, 0.0, 10.0, 10.0, 10.0];
    let w = vec![1.0f32, 1.0, 1.0, 9.0, 9.0, 9.0];
    let dataset = Dataset::builder()
        .column(Column::numerical("x", vec![1.0; 6]))
        .column(Column::numerical("w", w))
        .column(Column::numerical("y", y))
        .label("y")
        .weight("w")
        .build()
        .unwrap();

    let mut config = TrainingConfig::bagging(Task::Regression, "y").with_weights("w");
    config.num_trees = 1;
    config.tree.max_depth = 1;
    config.ensemble = Ensemble::Bagging(canopy::config::BaggingParams {
        bootstrap: false,
        examples_ratio: 1.0,
    });
    config.deployment.num_threads = Some(1);

    let output = ForestTrainer::new(config).unwrap().train(&dataset).unwrap();
    // x is constant so no split exists; the single leaf is the weighted mean.
    let pred = output.model.predict_row(&dataset, 0);
    assert!((pred - 9.0).abs() < 1e-4, "weighted mean expected, got {pred}");
}
