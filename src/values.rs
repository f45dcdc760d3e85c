//! Host-side arithmetic on action-value vectors

/// Temperature divisor used by hierarchical policies when turning leaf
/// values into a distribution. Lower than 1.0, so sharper than [`softmax`].
pub const HIERARCHICAL_TEMPERATURE: f32 = 0.15;

/// Index of the largest value, first one on ties. `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// Scale a vector to unit L2 norm. A zero vector is returned unchanged.
pub fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return values.to_vec();
    }
    values.iter().map(|v| v / norm).collect()
}

/// Softmax with the maximum subtracted before exponentiating.
pub fn softmax(values: &[f32]) -> Vec<f32> {
    tempered_softmax(values, 1.0)
}

/// Softmax of `values / temperature`.
pub fn tempered_softmax(values: &[f32], temperature: f32) -> Vec<f32> {
    let mask = vec![true; values.len()];
    masked_softmax(values, &mask, temperature)
}

/// Tempered softmax over the positions where `mask` is set. Masked-out
/// positions get exactly zero probability. If nothing is selected the
/// softmax falls back to every position.
pub fn masked_softmax(values: &[f32], mask: &[bool], temperature: f32) -> Vec<f32> {
    debug_assert_eq!(values.len(), mask.len());
    if !mask.iter().any(|&m| m) {
        if values.is_empty() {
            return Vec::new();
        }
        return tempered_softmax(values, temperature);
    }

    let max = values
        .iter()
        .zip(mask)
        .filter(|(_, m)| **m)
        .map(|(v, _)| *v)
        .fold(f32::NEG_INFINITY, f32::max);

    let exps: Vec<f32> = values
        .iter()
        .zip(mask)
        .map(|(&v, &m)| if m { ((v - max) / temperature).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();

    exps.into_iter().map(|e| e / sum).collect()
}
