use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::Value;

use crate::data::kind::DataKind;
use crate::data::labels::LabelIndex;
use crate::error::{Error, Result};
use crate::math::tensor::{element_count, sample_standard_normal, Tensor};

/// Turns free text into a fixed-width embedding vector.
///
/// Implementations must be deterministic: the same text yields the same
/// vector for the life of the process, so that training and inference agree.
pub trait TextEncoder: Send + Sync {
    /// Embedding width in elements.
    fn dim(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

/// Deterministic text encoder built on hashed token seeds.
///
/// Each lowercased alphanumeric token seeds a fixed pseudo-random Gaussian
/// vector; the embedding is the mean over all token vectors, so token order
/// does not matter but token identity does. Empty text embeds to zeros.
pub struct HashingTextEncoder {
    dim: usize,
}

impl HashingTextEncoder {
    pub const DEFAULT_DIM: usize = 256;

    pub fn new(dim: usize) -> HashingTextEncoder {
        HashingTextEncoder { dim }
    }
}

impl Default for HashingTextEncoder {
    fn default() -> Self {
        HashingTextEncoder::new(HashingTextEncoder::DEFAULT_DIM)
    }
}

impl TextEncoder for HashingTextEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let mut pooled = vec![0.0; self.dim];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let mut rng = StdRng::seed_from_u64(hasher.finish());
            for slot in pooled.iter_mut() {
                *slot += sample_standard_normal(&mut rng);
            }
            tokens += 1;
        }

        if tokens > 0 {
            for slot in pooled.iter_mut() {
                *slot /= tokens as f64;
            }
        }
        Ok(pooled)
    }
}

/// Decodes a single raw sample into a normalized tensor.
///
/// `reference` is interpreted per kind: a file name for images and raw
/// arrays (resolved against the context directory when one is set), the
/// text itself for `Text`, and the label itself for `Categorical`.
pub struct SampleNormalizer<'a> {
    encoder: &'a dyn TextEncoder,
    context: Option<&'a Path>,
    labels: Option<&'a LabelIndex>,
}

impl<'a> SampleNormalizer<'a> {
    pub fn new(encoder: &'a dyn TextEncoder) -> SampleNormalizer<'a> {
        SampleNormalizer {
            encoder,
            context: None,
            labels: None,
        }
    }

    /// Directory that file references are resolved against.
    pub fn with_context(mut self, dir: &'a Path) -> SampleNormalizer<'a> {
        self.context = Some(dir);
        self
    }

    /// Label index used to one-hot encode categorical samples.
    pub fn with_labels(mut self, labels: &'a LabelIndex) -> SampleNormalizer<'a> {
        self.labels = Some(labels);
        self
    }

    pub fn normalize(&self, kind: DataKind, reference: &str) -> Result<Tensor> {
        match kind {
            DataKind::ColorImage => self.color_image(reference),
            DataKind::GrayscaleImage => self.grayscale_image(reference),
            DataKind::Audio | DataKind::Opaque => self.raw_array(reference),
            DataKind::Text => Ok(Tensor::from_vec(self.encoder.embed(reference)?)),
            DataKind::Categorical => {
                let labels = self.labels.ok_or_else(|| {
                    Error::Configuration(
                        "categorical samples need a label index to encode against".to_string(),
                    )
                })?;
                labels.encode(reference)
            }
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        match self.context {
            Some(dir) => dir.join(reference),
            None => PathBuf::from(reference),
        }
    }

    /// Channel-last `(height, width, 3)`, pixels scaled to [0, 1].
    fn color_image(&self, reference: &str) -> Result<Tensor> {
        let path = self.resolve(reference);
        let img = image::open(&path).map_err(|e| Error::UnreadableImage {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let data = rgb
            .pixels()
            .flat_map(|p| p.0.iter().map(|&c| c as f64 / 255.0))
            .collect();
        Ok(Tensor::from_shape_vec(
            &[height as usize, width as usize, 3],
            data,
        ))
    }

    /// Channel-last `(height, width, 1)`, pixels scaled to [0, 1].
    fn grayscale_image(&self, reference: &str) -> Result<Tensor> {
        let path = self.resolve(reference);
        let img = image::open(&path).map_err(|e| Error::UnreadableImage {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let gray = img.to_luma8();
        let (width, height) = gray.dimensions();
        let data = gray.pixels().map(|p| p.0[0] as f64 / 255.0).collect();
        Ok(Tensor::from_shape_vec(
            &[height as usize, width as usize, 1],
            data,
        ))
    }

    /// A JSON numeric array, either nested (`[[1, 2], [3, 4]]`, shape
    /// inferred from nesting) or a `{"shape": ..., "data": ...}` object.
    /// Values are taken as-is; no scaling is applied.
    fn raw_array(&self, reference: &str) -> Result<Tensor> {
        let path = self.resolve(reference);
        let text = fs::read_to_string(&path)
            .map_err(|e| malformed(reference, e.to_string()))?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| malformed(reference, e.to_string()))?;
        tensor_from_value(reference, &value)
    }
}

fn malformed(reference: &str, reason: String) -> Error {
    Error::MalformedArray {
        reference: reference.to_string(),
        reason,
    }
}

#[derive(Deserialize)]
struct ShapedArrayFile {
    shape: Vec<usize>,
    data: Vec<f64>,
}

fn tensor_from_value(reference: &str, value: &Value) -> Result<Tensor> {
    match value {
        Value::Object(_) => {
            let file: ShapedArrayFile = serde_json::from_value(value.clone())
                .map_err(|e| malformed(reference, e.to_string()))?;
            if element_count(&file.shape) != file.data.len() {
                return Err(malformed(
                    reference,
                    format!(
                        "shape {:?} expects {} elements, data holds {}",
                        file.shape,
                        element_count(&file.shape),
                        file.data.len()
                    ),
                ));
            }
            Ok(Tensor {
                shape: file.shape,
                data: file.data,
            })
        }
        Value::Array(_) => {
            let shape = nested_shape(value);
            let mut data = Vec::with_capacity(element_count(&shape));
            fill_nested(reference, value, &shape, 0, &mut data)?;
            Ok(Tensor { shape, data })
        }
        other => Err(malformed(
            reference,
            format!("expected an array or a shape/data object, got {}", other),
        )),
    }
}

/// Shape implied by the first-element spine of a nested array.
/// `fill_nested` then enforces it everywhere else.
fn nested_shape(value: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut cursor = value;
    while let Value::Array(arr) = cursor {
        shape.push(arr.len());
        match arr.first() {
            Some(inner) => cursor = inner,
            None => break,
        }
    }
    shape
}

fn fill_nested(
    reference: &str,
    value: &Value,
    shape: &[usize],
    depth: usize,
    out: &mut Vec<f64>,
) -> Result<()> {
    if depth == shape.len() {
        return match value.as_f64() {
            Some(x) => {
                out.push(x);
                Ok(())
            }
            None => Err(malformed(
                reference,
                format!("expected a number at depth {}, got {}", depth, value),
            )),
        };
    }
    match value {
        Value::Array(arr) if arr.len() == shape[depth] => {
            for inner in arr {
                fill_nested(reference, inner, shape, depth + 1, out)?;
            }
            Ok(())
        }
        Value::Array(arr) => Err(malformed(
            reference,
            format!(
                "ragged array: expected {} elements at depth {}, got {}",
                shape[depth],
                depth,
                arr.len()
            ),
        )),
        other => Err(malformed(
            reference,
            format!("expected an array at depth {}, got {}", depth, other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::labels::LabelIndex;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("trellis-norm-{}-{}", std::process::id(), name))
    }

    fn encoder() -> HashingTextEncoder {
        HashingTextEncoder::new(16)
    }

    #[test]
    fn grayscale_image_normalizes_to_unit_range() {
        let path = temp_path("gray.png");
        let img = image::ImageBuffer::from_fn(28, 28, |x, y| {
            image::Luma([((x + y) % 256) as u8])
        });
        img.save(&path).unwrap();

        let enc = encoder();
        let t = SampleNormalizer::new(&enc)
            .normalize(DataKind::GrayscaleImage, path.to_str().unwrap())
            .unwrap();
        assert_eq!(t.shape, vec![28, 28, 1]);
        assert!(t.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
        // pixel (x=1, y=0) has value 1
        assert!((t.data[1] - 1.0 / 255.0).abs() < 1e-12);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn color_image_is_channel_last() {
        let path = temp_path("rgb.png");
        let img = image::ImageBuffer::from_fn(4, 3, |x, _y| {
            image::Rgb([(10 + x) as u8, 20, 30])
        });
        img.save(&path).unwrap();

        let enc = encoder();
        let t = SampleNormalizer::new(&enc)
            .normalize(DataKind::ColorImage, path.to_str().unwrap())
            .unwrap();
        assert_eq!(t.shape, vec![3, 4, 3]);
        // first pixel: r=10, g=20, b=30
        assert!((t.data[0] - 10.0 / 255.0).abs() < 1e-12);
        assert!((t.data[1] - 20.0 / 255.0).abs() < 1e-12);
        assert!((t.data[2] - 30.0 / 255.0).abs() < 1e-12);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_image_is_unreadable() {
        let enc = encoder();
        let got = SampleNormalizer::new(&enc).normalize(DataKind::ColorImage, "no-such-file.png");
        assert!(matches!(got, Err(Error::UnreadableImage { .. })));
    }

    #[test]
    fn nested_array_infers_shape() {
        let path = temp_path("nested.json");
        fs::write(&path, "[[1, 2], [3, 4], [5, 6]]").unwrap();

        let enc = encoder();
        let t = SampleNormalizer::new(&enc)
            .normalize(DataKind::Opaque, path.to_str().unwrap())
            .unwrap();
        assert_eq!(t.shape, vec![3, 2]);
        assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn shaped_object_is_accepted() {
        let path = temp_path("shaped.json");
        fs::write(&path, r#"{"shape": [2, 2], "data": [1, 2, 3, 4]}"#).unwrap();

        let enc = encoder();
        let t = SampleNormalizer::new(&enc)
            .normalize(DataKind::Audio, path.to_str().unwrap())
            .unwrap();
        assert_eq!(t.shape, vec![2, 2]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn ragged_array_is_malformed() {
        let path = temp_path("ragged.json");
        fs::write(&path, "[[1, 2], [3]]").unwrap();

        let enc = encoder();
        let got = SampleNormalizer::new(&enc).normalize(DataKind::Opaque, path.to_str().unwrap());
        assert!(matches!(got, Err(Error::MalformedArray { .. })));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn shape_data_mismatch_is_malformed() {
        let path = temp_path("mismatch.json");
        fs::write(&path, r#"{"shape": [3], "data": [1, 2]}"#).unwrap();

        let enc = encoder();
        let got = SampleNormalizer::new(&enc).normalize(DataKind::Audio, path.to_str().unwrap());
        assert!(matches!(got, Err(Error::MalformedArray { .. })));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn references_resolve_against_context() {
        let dir = temp_path("ctx-dir");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("sample.json"), "[1, 2, 3]").unwrap();

        let enc = encoder();
        let t = SampleNormalizer::new(&enc)
            .with_context(&dir)
            .normalize(DataKind::Opaque, "sample.json")
            .unwrap();
        assert_eq!(t.shape, vec![3]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn text_embedding_is_deterministic_and_order_free() {
        let enc = encoder();
        let norm = SampleNormalizer::new(&enc);
        let a = norm.normalize(DataKind::Text, "good morning").unwrap();
        let b = norm.normalize(DataKind::Text, "good morning").unwrap();
        let c = norm.normalize(DataKind::Text, "morning good").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.shape, vec![16]);

        let d = norm.normalize(DataKind::Text, "good evening").unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn repeated_token_pools_to_itself() {
        let enc = encoder();
        let once = enc.embed("cat").unwrap();
        let twice = enc.embed("cat CAT").unwrap();
        for (a, b) in once.iter().zip(&twice) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_text_embeds_to_zeros() {
        let enc = encoder();
        let v = enc.embed("  ,, ").unwrap();
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn categorical_requires_label_index() {
        let enc = encoder();
        let got = SampleNormalizer::new(&enc).normalize(DataKind::Categorical, "cat");
        assert!(matches!(got, Err(Error::Configuration(_))));

        let entries = vec![
            ("cat".to_string(), "cat".to_string()),
            ("dog".to_string(), "dog".to_string()),
        ];
        let ix = LabelIndex::from_entries(&entries);
        let t = SampleNormalizer::new(&enc)
            .with_labels(&ix)
            .normalize(DataKind::Categorical, "dog")
            .unwrap();
        assert_eq!(t.data, vec![0.0, 1.0]);
    }
}
