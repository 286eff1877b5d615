//! Integration tests for the knowledge distillation loss.
//!
//! Exercises the loss through the public API the way a host runtime drives
//! it: setup once, reshape on shape changes, forward and backward per step.

use destilar::config::load_config;
use destilar::{
    Blob, DistillConfig, Error, KnowledgeDistillationLoss, LossLayer, NormalizationMode,
    PropagateDown,
};
use std::io::Write;
use tempfile::NamedTempFile;

fn blob(shape: &[usize], values: &[f32]) -> Blob {
    Blob::from_shape_vec(shape, values.to_vec()).unwrap()
}

/// Loss at the current student logits, with a fresh forward pass
fn loss_at(layer: &mut KnowledgeDistillationLoss, bottom: &[Blob]) -> f32 {
    layer.forward(bottom).unwrap()
}

#[test]
fn test_end_to_end_three_classes() {
    let mut bottom = vec![blob(&[1, 3], &[1.0, 2.0, 3.0]), blob(&[1, 3], &[3.0, 2.0, 1.0])];
    let mut layer = KnowledgeDistillationLoss::setup(DistillConfig::new(1.0)).unwrap();
    layer.reshape(&bottom).unwrap();

    let loss = layer.forward(&bottom).unwrap();
    let p = layer.student_probabilities().data().to_vec();
    let q = layer.teacher_probabilities().data().to_vec();

    let expected: f32 = p.iter().zip(&q).map(|(&p, &q)| -q * (p / q).ln()).sum();
    assert!((loss - expected).abs() < 1e-6);
    assert!((p[0] - 0.090).abs() < 1e-3);
    assert!((q[0] - 0.665).abs() < 1e-3);

    layer
        .backward(1.0, &PropagateDown::first_of(2), &mut bottom)
        .unwrap();
    let grad = bottom[0].diff();
    assert!((grad[0] + 0.575).abs() < 1e-3);
    assert!(grad[1].abs() < 1e-6);
    assert!((grad[2] - 0.575).abs() < 1e-3);
}

#[test]
fn test_gradient_matches_finite_difference() {
    let temperature = 2.0;
    let student = [0.5, -1.0, 2.0, 0.0, 1.5, 1.0, -0.5, 0.25];
    let teacher = [1.0, 0.0, 3.0, -2.0, 0.5, 2.5, 0.0, -1.0];
    // (N=2, C=4): two positions
    let mut bottom = vec![blob(&[2, 4], &student), blob(&[2, 4], &teacher)];

    let mut layer = KnowledgeDistillationLoss::setup(DistillConfig::new(temperature)).unwrap();
    layer.reshape(&bottom).unwrap();
    layer.forward(&bottom).unwrap();
    layer
        .backward(1.0, &PropagateDown::first_of(2), &mut bottom)
        .unwrap();
    let analytic = bottom[0].diff().clone();

    let h = 1e-2;
    for idx in 0..student.len() {
        bottom[0].data_mut()[idx] = student[idx] + h;
        let plus = loss_at(&mut layer, &bottom);
        bottom[0].data_mut()[idx] = student[idx] - h;
        let minus = loss_at(&mut layer, &bottom);
        bottom[0].data_mut()[idx] = student[idx];

        // The gradient carries the T² distillation factor
        let numeric = temperature * temperature * (plus - minus) / (2.0 * h);
        assert!(
            (analytic[idx] - numeric).abs() < 2e-3,
            "index {idx}: analytic {} vs numeric {numeric}",
            analytic[idx]
        );
    }
}

#[test]
fn test_spatial_inputs_with_ignore_label() {
    // (N=2, C=3, H=2): labels address the four (n, h) positions
    let student: Vec<f32> = (0..12).map(|v| (v as f32 * 0.7).sin()).collect();
    let teacher: Vec<f32> = (0..12).map(|v| (v as f32 * 0.3).cos()).collect();
    let labels = blob(&[2, 1, 2], &[0.0, 255.0, 255.0, 2.0]);

    let config = DistillConfig::new(2.0).with_ignore_label(255);
    let mut layer = KnowledgeDistillationLoss::setup(config).unwrap();
    let mut bottom = vec![
        blob(&[2, 3, 2], &student),
        blob(&[2, 3, 2], &teacher),
        labels,
    ];
    layer.reshape(&bottom).unwrap();
    let loss = layer.forward(&bottom).unwrap();
    assert!(loss.is_finite() && loss > 0.0);

    layer
        .backward(1.0, &PropagateDown::first_of(3), &mut bottom)
        .unwrap();
    let grad = bottom[0].diff();

    // (n=0, h=1) and (n=1, h=0) are ignored
    for c in 0..3 {
        assert_eq!(grad[c * 2 + 1], 0.0);
        assert_eq!(grad[6 + c * 2], 0.0);
    }
    assert!((0..3).any(|c| grad[c * 2] != 0.0));
    assert!((0..3).any(|c| grad[6 + c * 2 + 1] != 0.0));
}

#[test]
fn test_valid_normalization_counts_only_unmasked_positions() {
    let student = blob(&[4, 2], &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
    let teacher = blob(&[4, 2], &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    let labels = blob(&[4], &[1.0, -1.0, -1.0, -1.0]);

    let valid = DistillConfig::new(1.0).with_ignore_label(-1);
    let full = valid.with_normalization(NormalizationMode::Full);

    let bottom = vec![student, teacher, labels];
    let mut valid_layer = KnowledgeDistillationLoss::setup(valid).unwrap();
    valid_layer.reshape(&bottom).unwrap();
    let mut full_layer = KnowledgeDistillationLoss::setup(full).unwrap();
    full_layer.reshape(&bottom).unwrap();

    let valid_loss = valid_layer.forward(&bottom).unwrap();
    let full_loss = full_layer.forward(&bottom).unwrap();
    assert!((valid_loss - 4.0 * full_loss).abs() < 1e-5);
}

#[test]
fn test_reshape_on_batch_size_change() {
    let mut layer = KnowledgeDistillationLoss::setup(DistillConfig::new(1.0)).unwrap();

    let small = vec![blob(&[1, 3], &[1.0, 2.0, 3.0]), blob(&[1, 3], &[3.0, 2.0, 1.0])];
    layer.reshape(&small).unwrap();
    let small_loss = layer.forward(&small).unwrap();

    let large = vec![
        blob(&[2, 3], &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]),
        blob(&[2, 3], &[3.0, 2.0, 1.0, 3.0, 2.0, 1.0]),
    ];
    // Stale shapes are refused until the host reshapes
    assert!(matches!(
        layer.forward(&large),
        Err(Error::ShapeMismatch { .. })
    ));

    layer.reshape(&large).unwrap();
    let large_loss = layer.forward(&large).unwrap();
    assert!((small_loss - large_loss).abs() < 1e-6);
    assert_eq!(layer.geometry().unwrap().outer_num, 2);
}

#[test]
fn test_driven_through_trait_object() {
    let config = DistillConfig::new(4.0).with_normalization(NormalizationMode::BatchSize);
    let mut layer: Box<dyn LossLayer> =
        Box::new(KnowledgeDistillationLoss::setup(config).unwrap());
    let mut bottom = vec![blob(&[2, 2], &[3.0, 1.0, 0.0, 2.0]), blob(&[2, 2], &[1.0, 3.0, 2.0, 0.0])];

    assert_eq!(layer.layer_type(), "KnowledgeDistillation");
    layer.reshape(&bottom).unwrap();
    let loss = layer.forward(&bottom).unwrap();
    assert!(loss > 0.0);

    let err = layer
        .backward(1.0, &PropagateDown::new(vec![false, true]), &mut bottom)
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedGradientRequest { .. }));
}

#[test]
fn test_loss_from_yaml_config() {
    let yaml = r#"
temperature: 2.0
ignore_label: -1
normalize: false
"#;
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(yaml.as_bytes()).unwrap();

    let config = load_config(temp_file.path()).unwrap();
    assert_eq!(config.normalization(), NormalizationMode::BatchSize);

    let mut layer = KnowledgeDistillationLoss::setup(config).unwrap();
    let mut bottom = vec![
        blob(&[2, 3], &[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]),
        blob(&[2, 3], &[3.0, 2.0, 1.0, 0.0, 0.0, 0.0]),
        blob(&[2], &[0.0, -1.0]),
    ];
    let loss = layer.step(&mut bottom, &PropagateDown::first_of(3)).unwrap();

    // BATCH_SIZE divides by N = 2 even though one example is ignored
    let summed = DistillConfig::new(2.0).with_normalization(NormalizationMode::None);
    let mut unmasked = KnowledgeDistillationLoss::setup(summed).unwrap();
    let single = vec![blob(&[1, 3], &[1.0, 2.0, 3.0]), blob(&[1, 3], &[3.0, 2.0, 1.0])];
    unmasked.reshape(&single).unwrap();
    let single_loss = unmasked.forward(&single).unwrap();
    assert!((loss - single_loss / 2.0).abs() < 1e-6);
}
