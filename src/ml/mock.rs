//! Closed-form yield estimate used when no real model can be loaded.
//!
//! Inputs are the four encoded fields of the `features` schema:
//! soil pH, crop code, season code, region code.

use crate::domain::{ModelKind, NamedInput, OutputTensor};
use crate::error::{AgriError, Result};
use crate::ml::backend::InferenceBackend;

const BASE_YIELD: f32 = 0.5;
const MIN_YIELD: f32 = 0.1;
const MAX_YIELD: f32 = 1.0;

pub const MOCK_INPUT_NAME: &str = "input";
pub const MOCK_OUTPUT_NAME: &str = "output";

/// Affine factor `offset + slope * x`, never below `lo`.
///
/// `f32::max` drops a NaN operand, so a NaN input lands on `lo`.
fn at_least(x: f32, offset: f32, slope: f32, lo: f32) -> f32 {
    (offset + slope * x).max(lo)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockPredictor;

impl MockPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Yield estimate in `[0.1, 1.0]`. Pure and total.
    pub fn predict(&self, soil_ph: f32, crop: f32, season: f32, region: f32) -> f32 {
        // Optimum pH sits around 6.5; below 5 the factor bottoms out.
        let ph_factor = at_least(soil_ph, -5.0 / 3.0, 1.0 / 3.0, 0.0).min(1.0);
        // Codes are non-negative; the floors only catch NaN and negatives.
        // Larger codes keep growing and the final clamp bounds the product.
        let crop_factor = at_least(crop, 0.8, 0.05, 0.8);
        let season_factor = at_least(season, 0.9, 0.1, 0.9);
        let region_factor = at_least(region, 0.85, 0.1, 0.85);

        let prediction = BASE_YIELD * ph_factor * crop_factor * season_factor * region_factor;
        prediction.max(MIN_YIELD).min(MAX_YIELD)
    }
}

impl InferenceBackend for MockPredictor {
    fn kind(&self) -> ModelKind {
        ModelKind::Mock
    }

    fn input_names(&self) -> Vec<String> {
        vec![MOCK_INPUT_NAME.to_string()]
    }

    fn output_names(&self) -> Vec<String> {
        vec![MOCK_OUTPUT_NAME.to_string()]
    }

    fn run(&self, inputs: &[NamedInput]) -> Result<OutputTensor> {
        let input = inputs
            .iter()
            .find(|i| i.name == MOCK_INPUT_NAME)
            .ok_or_else(|| {
                let got: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
                AgriError::Validation(format!(
                    "mock predictor expects a '{MOCK_INPUT_NAME}' tensor, got {got:?}"
                ))
            })?;

        let [soil_ph, crop, season, region] = match input.values.as_slice() {
            [a, b, c, d, ..] => [*a, *b, *c, *d],
            other => {
                return Err(AgriError::Validation(format!(
                    "mock predictor needs 4 features, got {}",
                    other.len()
                )))
            }
        };

        let prediction = self.predict(soil_ph, crop, season, region);
        Ok(OutputTensor::new(vec![1, 1], vec![prediction]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn baseline_factors_product() {
        // 0.5 * 0.5 * 0.8 * 0.9 * 0.85
        let p = MockPredictor::new().predict(6.5, 0.0, 0.0, 0.0);
        assert!(approx(p, 0.153), "got {p}");
    }

    #[test]
    fn encoded_example_vector() {
        // 0.5 * 0.5 * 0.8 * 1.0 * 1.05
        let p = MockPredictor::new().predict(6.5, 0.0, 1.0, 2.0);
        assert!(approx(p, 0.21), "got {p}");
    }

    #[test]
    fn acidic_soil_hits_floor() {
        let p = MockPredictor::new().predict(4.0, 3.0, 2.0, 1.0);
        assert!(approx(p, MIN_YIELD));
    }

    #[test]
    fn large_codes_hit_ceiling_of_prediction() {
        let p = MockPredictor::new().predict(8.0, 100.0, 100.0, 100.0);
        assert_eq!(p, MAX_YIELD);
    }

    #[test]
    fn crop_codes_above_eight_keep_growing() {
        // 0.5 * (2/3) * 1.3 * 0.9 * 0.85
        let p = MockPredictor::new().predict(7.0, 10.0, 0.0, 0.0);
        assert!(approx(p, 0.3315), "got {p}");
    }

    #[test]
    fn high_season_and_region_codes_are_not_capped() {
        // 0.5 * 1.0 * 0.8 * 1.3 * 1.35
        let p = MockPredictor::new().predict(8.0, 0.0, 4.0, 5.0);
        assert!(approx(p, 0.702), "got {p}");
    }

    #[test]
    fn infinite_codes_stay_bounded() {
        let mock = MockPredictor::new();
        assert_eq!(mock.predict(8.0, f32::INFINITY, 0.0, 0.0), MAX_YIELD);
        // Zero pH factor times an infinite factor is NaN, which lands on the floor.
        assert_eq!(mock.predict(4.0, f32::INFINITY, 0.0, 0.0), MIN_YIELD);
    }

    #[test]
    fn nan_inputs_stay_bounded() {
        let p = MockPredictor::new().predict(f32::NAN, f32::NAN, f32::NAN, f32::NAN);
        assert!((MIN_YIELD..=MAX_YIELD).contains(&p));
    }

    #[test]
    fn run_returns_single_cell() {
        let mock = MockPredictor::new();
        let input = NamedInput::new("input", vec![1, 4], vec![6.5, 0.0, 1.0, 2.0]);
        let out = mock.run(&[input]).unwrap();
        assert_eq!(out.shape, vec![1, 1]);
        assert!(approx(out.values[0], 0.21));
    }

    #[test]
    fn run_ignores_trailing_features() {
        let mock = MockPredictor::new();
        let input = NamedInput::new("input", vec![1, 6], vec![6.5, 0.0, 1.0, 2.0, 9.0, 9.0]);
        let out = mock.run(&[input]).unwrap();
        assert!(approx(out.values[0], 0.21));
    }

    #[test]
    fn run_rejects_short_vector() {
        let mock = MockPredictor::new();
        let input = NamedInput::new("input", vec![1, 2], vec![6.5, 0.0]);
        let err = mock.run(&[input]).unwrap_err();
        assert!(err.to_string().contains("needs 4 features"));
    }

    #[test]
    fn run_rejects_named_agronomic_inputs() {
        let mock = MockPredictor::new();
        let inputs = crate::domain::AgronomicFeatures::example().to_inputs();
        assert!(mock.run(&inputs).is_err());
    }

    proptest! {
        #[test]
        fn prediction_always_within_bounds(
            ph in prop::num::f32::ANY,
            crop in prop::num::f32::ANY,
            season in prop::num::f32::ANY,
            region in prop::num::f32::ANY,
        ) {
            let p = MockPredictor::new().predict(ph, crop, season, region);
            prop_assert!((MIN_YIELD..=MAX_YIELD).contains(&p), "got {}", p);
        }

        #[test]
        fn prediction_is_pure(
            ph in -20.0f32..20.0,
            crop in -10.0f32..10.0,
            season in -10.0f32..10.0,
            region in -10.0f32..10.0,
        ) {
            let mock = MockPredictor::new();
            prop_assert_eq!(
                mock.predict(ph, crop, season, region).to_bits(),
                mock.predict(ph, crop, season, region).to_bits()
            );
        }
    }
}
