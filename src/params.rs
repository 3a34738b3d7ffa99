use std::collections::HashMap;

/// Extract a parameter as f64 with a default value
pub fn get_param(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Extract a parameter as usize with a minimum value
pub fn get_param_usize(
    params: &HashMap<String, f64>,
    key: &str,
    default: usize,
    min: usize,
) -> usize {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round().max(min as f64) as usize)
        .unwrap_or(default)
}

/// Extract a fractional parameter (e.g. a stop-loss ratio), clamped to [0, 1]
pub fn get_param_fraction(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    let raw = params.get(key).copied().unwrap_or(default);
    if !raw.is_finite() {
        return default;
    }
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_missing_and_non_finite_values() {
        let mut params = HashMap::new();
        params.insert("bad".to_string(), f64::NAN);

        assert_eq!(get_param(&params, "missing", 7.0), 7.0);
        assert_eq!(get_param(&params, "bad", 7.0), 7.0);
        assert_eq!(get_param_usize(&params, "missing", 14, 1), 14);
    }

    #[test]
    fn clamps_fractions_into_unit_interval() {
        let mut params = HashMap::new();
        params.insert("stop_loss".to_string(), 1.8);
        assert_eq!(get_param_fraction(&params, "stop_loss", 0.05), 1.0);

        params.insert("stop_loss".to_string(), -0.2);
        assert_eq!(get_param_fraction(&params, "stop_loss", 0.05), 0.0);
    }
}
