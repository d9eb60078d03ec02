//! Server configuration, read once at startup from environment variables
//! and passed explicitly to every component — no global state,
//! avoiding an implicit-globals design.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_url: String,
    pub worker_pool_size: usize,
    pub task_queue_highwater: usize,
    pub task_result_ttl: Duration,
    pub milp_time_limit: Duration,
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            db_url: std::env::var("DB_URL").unwrap_or_else(|_| "forecast.db".to_string()),
            worker_pool_size: env_usize("WORKER_POOL_SIZE", num_cpus()),
            task_queue_highwater: env_usize("TASK_QUEUE_HIGHWATER", 1_000),
            task_result_ttl: Duration::from_secs(env_u64("TASK_RESULT_TTL_SECONDS", 3_600)),
            milp_time_limit: Duration::from_secs(env_u64("MILP_TIME_LIMIT_SECONDS", 10)),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string()),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_unset() {
        // SAFETY: test-only removal of vars this process doesn't otherwise rely on.
        unsafe {
            std::env::remove_var("WORKER_POOL_SIZE");
            std::env::remove_var("TASK_QUEUE_HIGHWATER");
        }
        let config = ServerConfig::from_env();
        assert_eq!(config.task_queue_highwater, 1_000);
        assert!(config.worker_pool_size >= 1);
    }
}
