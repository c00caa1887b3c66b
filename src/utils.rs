use std::time::{Duration, Instant};

/// Logs the time spent in a step since the previous checkpoint and returns the new checkpoint.
pub(crate) fn trace(l_type: &str, l_step: &str, start: Instant, prev: Duration) -> Duration {
    let now = start.elapsed();
    log::trace!("{} | Total={:.2?} | {}={:.2?}", l_type, now, l_step, now.saturating_sub(prev));
    now
}

pub(crate) fn human_bytes(size: f64) -> String {
    let units = ["", "K", "M", "G", "T", "P", "E"];
    let mut size = size;
    let mut unit_index = 0;
    let k = 1024.;

    while size >= k && unit_index < units.len() - 1 {
        size /= k;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}
