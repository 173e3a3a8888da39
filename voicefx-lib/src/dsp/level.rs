//! Helpers for converting between linear and dB gain values.

/// Floor used when converting silence to dB.
pub const MIN_DB: f32 = -120.0;

/// Convert a dB value to linear gain.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain to dB, flooring silence at [`MIN_DB`].
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 || !linear.is_finite() {
        return MIN_DB;
    }
    (20.0 * linear.log10()).max(MIN_DB)
}
