//! Text recognition: CRNN-style model output → text via greedy CTC decode.

use ndarray::{Array4, ArrayViewD};
use ort::session::Session;
use ort::value::Tensor;

use super::{classify_inference_error, OcrError};

pub struct TextRecognizer {
    session: Session,
    charset: Vec<char>,
}

#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

impl TextRecognizer {
    /// Recognizer with the printable-ASCII charset. The documents this
    /// pipeline handles are English court filings; identifiers are ASCII by
    /// definition.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            charset: ascii_charset(),
        }
    }

    pub fn recognize(&mut self, input: Array4<f32>) -> Result<Recognition, OcrError> {
        let input_tensor =
            Tensor::from_array(input).map_err(|e| OcrError::Process(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| classify_inference_error("recognition", &e.to_string()))?;

        let view = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Process(e.to_string()))?;
        let logits = view.to_owned();
        let shape = logits.shape().to_vec();
        drop(outputs);

        if shape.len() != 3 {
            return Err(OcrError::Process(format!(
                "unexpected recognition output shape: {shape:?}"
            )));
        }
        Ok(decode_ctc(&self.charset, &logits.view(), shape[1], shape[2]))
    }
}

/// Greedy CTC decode: argmax per timestep, collapse repeats, drop the blank
/// class (index 0). Class `i` maps to `charset[i - 1]`.
fn decode_ctc(
    charset: &[char],
    output: &ArrayViewD<f32>,
    seq_len: usize,
    num_classes: usize,
) -> Recognition {
    let mut text = String::new();
    let mut confidence_sum = 0.0f32;
    let mut char_count = 0u32;
    let mut last_idx: Option<usize> = None;

    for t in 0..seq_len {
        let mut max_prob = f32::NEG_INFINITY;
        let mut max_idx = 0;
        for c in 0..num_classes {
            let prob = output[[0, t, c]];
            if prob > max_prob {
                max_prob = prob;
                max_idx = c;
            }
        }

        if max_idx != 0 && Some(max_idx) != last_idx {
            if let Some(&ch) = charset.get(max_idx - 1) {
                text.push(ch);
                confidence_sum += 1.0 / (1.0 + (-max_prob).exp());
                char_count += 1;
            }
        }
        last_idx = Some(max_idx);
    }

    let confidence = if char_count > 0 {
        confidence_sum / char_count as f32
    } else {
        0.0
    };
    Recognition { text, confidence }
}

/// Printable ASCII, space through tilde.
fn ascii_charset() -> Vec<char> {
    (32u8..127).map(char::from).collect()
}
