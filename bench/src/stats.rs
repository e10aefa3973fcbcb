pub(crate) fn summarize_ms(samples_ms: &[f64]) -> (f64, f64, f64) {
    if samples_ms.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let p50_ms = percentile_ms(samples_ms, 0.50);
    let p95_ms = percentile_ms(samples_ms, 0.95);
    let avg_ms = samples_ms.iter().sum::<f64>() / samples_ms.len() as f64;
    (p50_ms, p95_ms, avg_ms)
}

fn percentile_ms(samples_ms: &[f64], quantile: f64) -> f64 {
    let mut sorted = samples_ms.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last_index = sorted.len().saturating_sub(1);
    let position = (quantile.clamp(0.0, 1.0) * last_index as f64).round() as usize;
    sorted[position]
}

#[cfg(test)]
mod tests {
    use super::summarize_ms;

    #[test]
    fn summarizes_unsorted_samples() {
        let (p50, p95, avg) = summarize_ms(&[4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!(p50, 3.0);
        assert_eq!(p95, 5.0);
        assert_eq!(avg, 3.0);
    }

    #[test]
    fn empty_samples_summarize_to_zero() {
        assert_eq!(summarize_ms(&[]), (0.0, 0.0, 0.0));
    }
}
