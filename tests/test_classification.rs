extern crate pneumo_detect;

use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array4;

use pneumo_detect::classification_runners::inference_process::InferenceProcess;
use pneumo_detect::common::{Diagnosis, Inference, InputTensor};
use pneumo_detect::pipeline::Preprocessor;

mod stubs;

use stubs::StubNetwork;

fn tensor() -> pneumo_detect::common::InputTensor {
    Preprocessor::default().preprocess(&stubs::gray_image(64, 64, 90)).unwrap()
}

#[test]
fn scenario_a_normal_at_eighty_percent() {
    let engine = stubs::engine_with(StubNetwork::new(&[0.1, 0.8, 0.1]));

    let classification = match engine.classify(&tensor()) {
        Inference::Classified(c) => c,
        Inference::Degraded { reason } => panic!("unexpected degraded result: {reason}"),
    };
    assert_eq!(classification.label, Diagnosis::Normal);
    assert_eq!(classification.label.as_str(), "normal");
    assert_eq!(classification.class_index, 1);
    assert!((classification.confidence - 80.0).abs() < 1e-4);
}

#[test]
fn ties_go_to_the_lowest_index() {
    let engine = stubs::engine_with(StubNetwork::new(&[0.4, 0.4, 0.2]));
    let inference = engine.classify(&tensor());
    assert_eq!(inference.class_index(), Some(0));
    assert_eq!(inference.classification().unwrap().label, Diagnosis::Bacterial);
}

#[test]
fn repeated_calls_agree() {
    let engine = stubs::engine_with(StubNetwork::new(&[0.2, 0.1, 0.7]));
    let input = tensor();
    let first = engine.classify(&input);
    for _ in 0..3 {
        assert_eq!(engine.classify(&input), first);
    }
    assert_eq!(first.classification().unwrap().label, Diagnosis::Viral);
}

#[test]
fn confidence_stays_within_bounds() {
    for probs in [[0.0, 0.0, 1.0], [0.34, 0.33, 0.33], [3.0, 1.0, 0.5]] {
        let engine = stubs::engine_with(StubNetwork::new(&probs));
        let c = engine.classify(&tensor()).classification().cloned().unwrap();
        assert!(c.confidence > 0.0 && c.confidence <= 100.0, "{:?} -> {}", probs, c.confidence);
    }
}

#[test]
fn malformed_output_degrades() {
    for probs in [vec![0.5, 0.5], vec![0.0, 0.0, 0.0], vec![f32::NAN, 0.2, 0.1]] {
        let engine = stubs::engine_with(StubNetwork::new(&probs));
        assert!(engine.classify(&tensor()).is_degraded(), "{:?} should degrade", probs);
    }
}

#[test]
fn failed_forward_pass_degrades_only_that_call() {
    let engine = stubs::engine_with(StubNetwork::new(&[0.1, 0.8, 0.1]).failing());
    assert!(engine.classify(&tensor()).is_degraded());
    assert!(engine.is_available());
}

#[test]
fn wrong_tensor_shape_degrades() {
    let engine = stubs::engine_with(StubNetwork::new(&[0.1, 0.8, 0.1]));
    let small = Preprocessor { size: 64, ..Default::default() }
        .preprocess(&stubs::gray_image(64, 64, 90))
        .unwrap();
    assert!(engine.classify(&small).is_degraded());
}

#[test]
fn aligned_input_is_not_copied() {
    let engine = stubs::engine_with(StubNetwork::new(&[0.1, 0.8, 0.1]));
    let x = tensor();

    match engine.preprocess(&x).unwrap() {
        Cow::Borrowed(aligned) => assert!(std::ptr::eq(aligned, &x)),
        Cow::Owned(_) => panic!("aligned input was copied"),
    }

    let mut bad = Array4::<f32>::zeros((1, 512, 512, 1));
    bad[[0, 3, 3, 0]] = f32::NAN;
    assert!(engine.preprocess(&InputTensor::from(bad)).is_err());
}

#[test]
fn missing_model_is_loaded_once_and_stays_degraded() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let engine = stubs::missing_model_engine(attempts.clone());

    for _ in 0..3 {
        match engine.classify(&tensor()) {
            Inference::Degraded { reason } => assert!(reason.contains("not found"), "{reason}"),
            other => panic!("expected degraded, got {:?}", other),
        }
    }
    assert!(engine.network().is_none());
    assert!(engine.load().is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_first_use_loads_once() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let engine = Arc::new(stubs::missing_model_engine(attempts.clone()));
    let input = Arc::new(tensor());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let input = input.clone();
            std::thread::spawn(move || engine.classify(&input).is_degraded())
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap());
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
