pub fn l2_norm(v: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for x in v {
        sum += x * x;
    }
    sum.sqrt()
}

pub fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32, b_norm: f32) -> f32 {
    let mut dot = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
    }
    dot / (a_norm * b_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let a = [1.0, 2.0, 2.0];
        let b = [2.0, 4.0, 4.0];
        let s = cosine_similarity(&a, &b, l2_norm(&a), l2_norm(&b));
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = [1.0, 0.0];
        let b = [0.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b, l2_norm(&a), l2_norm(&b)), 0.0);
    }
}
