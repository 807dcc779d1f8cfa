//! In-process configuration values for pipelines and HTTP stages

use std::time::Duration;

/// Default capacity of every inter-stage channel
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Default capacity of the driver's error channel
pub const DEFAULT_ERROR_CAPACITY: usize = 10;

/// Default timeout applied to HTTP requests
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Pipeline-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Capacity of each bounded edge between stages
    pub buffer_size: usize,
    /// Capacity of the sink error side-channel
    pub error_capacity: usize,
    /// Log a health summary at this period while running
    pub health_log_interval: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            error_capacity: DEFAULT_ERROR_CAPACITY,
            health_log_interval: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    pub fn with_health_log_interval(mut self, interval: Duration) -> Self {
        self.health_log_interval = Some(interval);
        self
    }

    /// Check values that would make channel construction impossible
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_size == 0 {
            return Err("buffer size must be positive".into());
        }
        if self.error_capacity == 0 {
            return Err("error channel capacity must be positive".into());
        }
        if self.health_log_interval == Some(Duration::ZERO) {
            return Err("health log interval must be positive".into());
        }
        Ok(())
    }
}

/// Settings shared by the HTTP source and sink
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            headers: Vec::new(),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Build a client honouring this configuration
    pub fn build_client(&self) -> anyhow::Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("{}/{}", app_name(), version()))
            .build()?;
        Ok(client)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.buffer_size, 100);
        assert_eq!(config.error_capacity, 10);
        assert!(config.health_log_interval.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_validation() {
        assert!(PipelineConfig::default().with_buffer_size(0).validate().is_err());
        assert!(PipelineConfig::default().with_error_capacity(0).validate().is_err());
        assert!(
            PipelineConfig::default()
                .with_health_log_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_http_defaults() {
        let config = HttpConfig::default().with_header("X-Source", "flowline");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.headers, vec![("X-Source".to_string(), "flowline".to_string())]);
        assert!(config.build_client().is_ok());
    }
}
