/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current UTC timestamp in seconds (Stripe's clock unit)
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Convert a Stripe epoch-seconds field into milliseconds
pub fn stripe_secs_to_millis(secs: i64) -> i64 {
    secs.saturating_mul(1000)
}
