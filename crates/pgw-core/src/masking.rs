//! Log-safe rendering of secrets.

/// Mask a secret for logging.
///
/// Values shorter than 8 characters become a fixed `"********"`. Longer
/// values keep a prefix of a quarter of their length, clamped to 3..=6
/// characters, followed by `***`.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len < 8 {
        return "********".to_string();
    }
    let visible = (len / 4).clamp(3, 6);
    let prefix: String = secret.chars().take(visible).collect();
    format!("{prefix}***")
}
