use orq_core::error::AppError;
use sha2::{Digest, Sha256};

use super::Embedder;

pub const DEFAULT_HASHING_DIMS: usize = 256;

/// Offline embedder: signed feature hashing of lowercase alphanumeric tokens, L2-normalised.
///
/// Deterministic across runs and platforms (SHA-256 bucketing, no RNG). The `model` argument
/// is mixed into the hash so vectors from different "models" never compare as equal.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dims: DEFAULT_HASHING_DIMS,
        }
    }
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Result<Self, AppError> {
        if dims == 0 {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Hashing embedder dims must be positive",
            ));
        }
        Ok(Self { dims })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    fn bucket(&self, model: &str, token: &str) -> (usize, f32) {
        let mut h = Sha256::new();
        h.update(model.as_bytes());
        h.update([0u8]);
        h.update(token.as_bytes());
        let d = h.finalize();
        let idx = u32::from_le_bytes([d[0], d[1], d[2], d[3]]) as usize % self.dims;
        let sign = if d[4] & 1 == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }
}

fn tokenize(input: &str) -> Vec<String> {
    input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl Embedder for HashingEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let mut v = vec![0.0f32; self.dims];
        let tokens = tokenize(input);
        for tok in tokens.iter() {
            let (idx, sign) = self.bucket(model, tok);
            v[idx] += sign;
        }
        // Adjacent pairs give "coupon code" / "discount code" some phrase signal.
        for pair in tokens.windows(2) {
            let (idx, sign) = self.bucket(model, &format!("{} {}", pair[0], pair[1]));
            v[idx] += 0.5 * sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_vector() {
        let e = HashingEmbedder::default();
        let a = e.embed("m", "Coupon: WELCOME10").expect("embed");
        let b = e.embed("m", "Coupon: WELCOME10").expect("embed");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_HASHING_DIMS);
    }

    #[test]
    fn output_is_unit_length_or_zero() {
        let e = HashingEmbedder::new(32).expect("dims");
        let v = e.embed("m", "status refunded vip").expect("embed");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        let z = e.embed("m", "  ,;  ").expect("embed");
        assert!(z.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn zero_dims_rejected() {
        assert_eq!(HashingEmbedder::new(0).expect_err("zero").code, "CONFIG_INVALID");
    }
}
