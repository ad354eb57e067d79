//! User-facing texts sent by the relays

/// Sent right away so the user knows the prompt was received
pub const PLEASE_WAIT: &str = "Дайте подумать...";

/// Sent when the prompt could not be queued or the solver failed
pub const SERVICE_UNAVAILABLE: &str =
    "Извините, сервис для общения с искусственным интеллектом временно не работает.";
