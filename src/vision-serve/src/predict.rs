use log::info;
use ndarray::Array4;
use serde::Serialize;

use crate::error::InferenceError;
use crate::loader::InferenceState;
use crate::timer::Timer;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Label of the most probable class
    pub class: String,

    /// Softmax probability of that class
    pub confidence: f32,
}

/// Turn raw scores into a probability distribution
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest entry, first one on ties
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
}

pub fn predict(input: &Array4<f32>, state: &InferenceState) -> Result<Prediction, InferenceError> {
    info!("Calling prediction on model");

    let mut t = Timer::start("Inference");
    let scores = state.model().forward(input)?;
    t.stop();

    if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
        return Err(InferenceError::NonFinite(index));
    }

    let probabilities = softmax(&scores);
    let (index, confidence) = argmax(&probabilities).ok_or(InferenceError::EmptyOutput)?;

    let labels = state.labels();
    let class = labels
        .get(index)
        .ok_or(InferenceError::LabelOutOfRange {
            index,
            labels: labels.len(),
        })?
        .clone();

    info!("Predicted class is {}", class);
    info!("Softmax confidence score is {}", confidence);

    Ok(Prediction { class, confidence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedModel;

    fn input() -> Array4<f32> {
        Array4::zeros((1, 3, 224, 224))
    }

    #[test]
    fn softmax_is_a_distribution() {
        for scores in [vec![1.0, 2.0, 3.0], vec![-50.0, 0.0], vec![1000.0, 999.0, -1000.0]] {
            let probs = softmax(&scores);
            let sum: f32 = probs.iter().sum();

            assert!((sum - 1.0).abs() < 1e-5);
            assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn softmax_of_equal_scores_is_uniform() {
        let probs = softmax(&[0.3; 4]);

        assert!(probs.iter().all(|p| (p - 0.25).abs() < 1e-6));
    }

    #[test]
    fn argmax_prefers_the_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn label_matches_the_most_probable_index() {
        let state = FixedModel::state(vec![0.5, 3.0, -1.0], &["cat", "dog", "bird"]);

        let prediction = predict(&input(), &state).unwrap();
        let probs = softmax(&[0.5, 3.0, -1.0]);

        assert_eq!(prediction.class, "dog");
        assert_eq!(Some((1, prediction.confidence)), argmax(&probs));
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn prediction_is_deterministic() {
        let state = FixedModel::state(vec![2.0, 1.0], &["cat", "dog"]);

        let first = predict(&input(), &state).unwrap();
        for _ in 0..5 {
            assert_eq!(predict(&input(), &state).unwrap(), first);
        }
    }

    #[test]
    fn non_finite_scores_are_inference_errors() {
        for scores in [
            vec![f32::NAN, 1.0],
            vec![1.0, f32::INFINITY],
            vec![f32::NEG_INFINITY, 0.0],
        ] {
            let state = FixedModel::state(scores, &["cat", "dog"]);

            let err = predict(&input(), &state).unwrap_err();
            assert!(matches!(err, InferenceError::NonFinite(_)));
        }
    }

    #[test]
    fn serializes_to_the_response_schema() {
        let prediction = Prediction {
            class: "cat".into(),
            confidence: 0.75,
        };

        assert_eq!(
            serde_json::to_value(&prediction).unwrap(),
            serde_json::json!({"class": "cat", "confidence": 0.75})
        );
    }
}
