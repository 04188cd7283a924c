use axum::{body::Bytes, extract::State, Json};
use tracing::{debug, warn};

use crate::api::{
    state::AppState,
    types::{ApiError, HealthResponse, PredictResponse, RootResponse},
};
use crate::domain::{AgronomicFeatures, FeatureList, NamedInput, RequestSchema};
use crate::error::Result;
use crate::ml::{mock::MOCK_INPUT_NAME, InferenceBackend};

/// GET /
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Agricultural Yield Prediction API".to_string(),
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.model.is_some(),
        model_type: state.model_kind(),
    })
}

/// POST /predict
///
/// The body is parsed here rather than through `Json` so that every
/// malformed request is answered with 400.
pub async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Json<PredictResponse>, ApiError> {
    let model = state.model.as_ref().ok_or_else(ApiError::model_not_loaded)?;

    let inputs = shape_request(state.schema, model.as_ref(), &body).map_err(|e| {
        debug!(error = %e, "Rejected prediction request");
        ApiError::prediction(e)
    })?;

    let output = model.run(&inputs).map_err(|e| {
        warn!(error = %e, "Inference failed");
        ApiError::prediction(e)
    })?;

    Ok(Json(PredictResponse {
        prediction: output.to_rows(),
    }))
}

/// Parse `body` under `schema` and shape it for `model`.
fn shape_request(
    schema: RequestSchema,
    model: &dyn InferenceBackend,
    body: &[u8],
) -> Result<Vec<NamedInput>> {
    match schema {
        RequestSchema::Agronomic => {
            let record: AgronomicFeatures = serde_json::from_slice(body)?;
            Ok(record.to_inputs())
        }
        RequestSchema::Features => {
            let list: FeatureList = serde_json::from_slice(body)?;
            let name = model
                .input_names()
                .into_iter()
                .next()
                .unwrap_or_else(|| MOCK_INPUT_NAME.to_string());
            Ok(vec![list.to_input(&name)?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelKind, OutputTensor};
    use crate::error::AgriError;
    use crate::ml::backend::MockInferenceBackend;
    use axum::http::StatusCode;
    use std::sync::Arc;

    fn state_with(mock: MockInferenceBackend, schema: RequestSchema) -> AppState {
        AppState::new(Some(Arc::new(mock)), schema)
    }

    #[tokio::test]
    async fn predict_without_model_is_server_error() {
        let state = AppState::new(None, RequestSchema::Features);
        let err = predict(State(state), Bytes::from_static(br#"{"features":[1.0]}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail, "Model not loaded");
    }

    #[tokio::test]
    async fn failing_backend_is_client_error() {
        let mut mock = MockInferenceBackend::new();
        mock.expect_input_names()
            .returning(|| vec!["float_input".to_string()]);
        mock.expect_run()
            .times(1)
            .returning(|_| Err(AgriError::Model("shape mismatch".into())));

        let state = state_with(mock, RequestSchema::Features);
        let err = predict(State(state), Bytes::from_static(br#"{"features":[6.5,0,1,2]}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.detail, "Prediction error: Model error: shape mismatch");
    }

    #[tokio::test]
    async fn features_are_bound_to_first_declared_input() {
        let mut mock = MockInferenceBackend::new();
        mock.expect_input_names()
            .returning(|| vec!["float_input".to_string()]);
        mock.expect_run()
            .withf(|inputs| {
                inputs.len() == 1
                    && inputs[0].name == "float_input"
                    && inputs[0].shape == vec![1, 3]
            })
            .returning(|_| Ok(OutputTensor::new(vec![1, 1], vec![0.42])));

        let state = state_with(mock, RequestSchema::Features);
        let Json(resp) = predict(State(state), Bytes::from_static(br#"{"features":[1,2,3]}"#))
            .await
            .unwrap();
        assert_eq!(resp.prediction, vec![vec![0.42]]);
    }

    #[tokio::test]
    async fn prediction_is_always_a_list_of_rows() {
        let mut mock = MockInferenceBackend::new();
        mock.expect_input_names()
            .returning(|| vec!["input".to_string()]);
        let mut outputs = vec![
            OutputTensor::new(vec![2, 1, 2], vec![1.0, 2.0, 3.0, 4.0]),
            OutputTensor::new(vec![3], vec![0.1, 0.2, 0.3]),
        ];
        mock.expect_run()
            .times(2)
            .returning(move |_| Ok(outputs.pop().unwrap()));

        let state = state_with(mock, RequestSchema::Features);
        let body = br#"{"features":[6.5,0,1,2]}"#;

        let Json(rank1) = predict(State(state.clone()), Bytes::from_static(body))
            .await
            .unwrap();
        assert_eq!(rank1.prediction, vec![vec![0.1, 0.2, 0.3]]);

        let Json(rank3) = predict(State(state), Bytes::from_static(body))
            .await
            .unwrap();
        assert_eq!(rank3.prediction, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[tokio::test]
    async fn malformed_body_never_reaches_the_model() {
        let mut mock = MockInferenceBackend::new();
        mock.expect_run().never();

        let state = state_with(mock, RequestSchema::Agronomic);
        let err = predict(State(state), Bytes::from_static(br#"{"rainfall":"lots"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.detail.starts_with("Prediction error: "));
    }

    #[tokio::test]
    async fn health_reports_model_kind() {
        let mut mock = MockInferenceBackend::new();
        mock.expect_kind().return_const(ModelKind::Onnx);
        let Json(resp) = health(State(state_with(mock, RequestSchema::Agronomic))).await;
        assert!(resp.model_loaded);
        assert_eq!(resp.model_type, Some(ModelKind::Onnx));

        let Json(resp) = health(State(AppState::new(None, RequestSchema::Agronomic))).await;
        assert!(!resp.model_loaded);
        assert_eq!(resp.model_type, None);
    }
}
