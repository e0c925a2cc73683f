//! Point-in-time network health snapshot.

/// A consistent snapshot of aggregate peer health, taken atomically against
/// the health map so concurrent peer churn can't produce a torn read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkStats {
    pub active_peer_count: usize,
    pub average_latency_ms: f64,
    pub total_message_count: u64,
    pub error_rate: f64,
}

impl NetworkStats {
    pub fn compute(latencies: &[f64], message_counts: &[u64], error_counts: &[u64], active_peer_count: usize) -> Self {
        let average_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };

        let total_message_count: u64 = message_counts.iter().sum();
        let total_errors: u64 = error_counts.iter().sum();
        let error_rate = if total_message_count == 0 {
            0.0
        } else {
            total_errors as f64 * 100.0 / total_message_count as f64
        };

        Self { active_peer_count, average_latency_ms, total_message_count, error_rate }
    }
}
