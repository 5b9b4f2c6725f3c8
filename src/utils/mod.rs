pub mod command;
pub mod event;
pub mod fw;

/// Returns the current username from the environment
pub fn get_username() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

/// Truncate a string to a maximum number of characters, appending an ellipsis if truncated
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format memory usage given in megabytes to a human-readable string
pub fn format_memory(memory_mb: f64) -> String {
    if memory_mb < 1024.0 {
        format!("{:.0}M", memory_mb)
    } else {
        format!("{:.1}G", memory_mb / 1024.0)
    }
}

/// Format time duration in a human-readable format
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / (24 * 3600);
    let hours = (seconds % (24 * 3600)) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}
