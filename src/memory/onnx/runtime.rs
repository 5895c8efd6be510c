//! ONNX Runtime backed inference session.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;

use crate::error::{PicoError, Result};

use super::engine::{InferenceSession, SessionInput, SessionOutput};

fn ort_err(e: ort::Error) -> PicoError {
    PicoError::Memory(format!("onnx runtime: {}", e))
}

/// [`InferenceSession`] implementation over an `ort` session.
///
/// The session is guarded by a mutex; embedding inference is serialized,
/// which matches the single-writer usage of the memory store.
pub struct OrtSession {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_name: String,
}

impl OrtSession {
    /// Load a model file into a new session.
    pub fn load(model_path: &Path) -> Result<Self> {
        let session = Session::builder()
            .map_err(ort_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_err)?
            .commit_from_file(model_path)
            .map_err(ort_err)?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| PicoError::Memory("model declares no outputs".to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            input_names,
            output_name,
        })
    }
}

impl InferenceSession for OrtSession {
    fn input_count(&self) -> usize {
        self.input_names.len()
    }

    fn run(&self, input: &SessionInput) -> Result<SessionOutput> {
        let shape = vec![input.batch as i64, input.seq_len as i64];

        // Feed input_ids, attention_mask, and token_type_ids in declaration
        // order, but only as many as the model declares.
        let tensors = [
            input.input_ids.clone(),
            input.attention_mask.clone(),
            input.token_type_ids.clone(),
        ];
        let mut feed: Vec<(Cow<'static, str>, SessionInputValue<'static>)> = Vec::new();
        for (name, data) in self.input_names.iter().zip(tensors.into_iter()) {
            let tensor = Tensor::from_array((shape.clone(), data)).map_err(ort_err)?;
            feed.push((Cow::Owned(name.clone()), tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| PicoError::Memory("onnx session lock poisoned".to_string()))?;
        let outputs = session.run(feed).map_err(ort_err)?;

        let value = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| PicoError::Memory(format!("missing output {}", self.output_name)))?;
        let (out_shape, data) = value.try_extract_tensor::<f32>().map_err(ort_err)?;

        Ok(SessionOutput {
            data: data.to_vec(),
            shape: out_shape.iter().map(|&d| d as usize).collect(),
        })
    }
}
