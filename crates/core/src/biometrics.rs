//! Biometric derivations.

/// Body mass index in kg/m², rounded to one decimal place.
///
/// Returns `None` unless both weight (kg) and height (cm) are present, finite and positive.
pub fn body_mass_index(weight_kg: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    let weight = weight_kg.filter(|w| w.is_finite() && *w > 0.0)?;
    let height_m = height_cm.filter(|h| h.is_finite() && *h > 0.0)? / 100.0;

    let bmi = weight / (height_m * height_m);
    Some((bmi * 10.0).round() / 10.0)
}
