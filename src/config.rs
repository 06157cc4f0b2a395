//! Configuration for SlabCache

use serde::Deserialize;

/// Smallest permitted connection limit
const MIN_CONNECTIONS: usize = 5;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub memory: MemoryConfig,
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_addr: String,

    /// Maximum number of concurrent connections (clamped to at least 5)
    pub max_connections: usize,

    /// Number of dispatcher workers executing commands (0 = number of CPUs)
    pub dispatch_workers: usize,

    /// Number of Tokio worker threads (0 = number of CPUs)
    pub worker_threads: usize,

    /// Staging buffer size per connection (bytes)
    pub read_buffer_size: usize,

    /// Response buffer size per worker (bytes)
    pub write_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5001".to_string(),
            max_connections: 1024,
            dispatch_workers: 0,
            worker_threads: 0,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
        }
    }
}

/// Memory arena configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Total arena capacity in bytes; rounded down to whole pages
    pub arena_capacity: usize,

    /// Page size in bytes, the granularity of arena allocation
    pub page_size: usize,

    /// Ascending chunk sizes, one slab per entry
    pub size_classes: Vec<usize>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            arena_capacity: 256 * 1024 * 1024, // 256 MiB
            page_size: 1024 * 1024,            // 1 MiB
            size_classes: default_size_classes(),
        }
    }
}

/// Default chunk sizes: 64 B doubling to 1 MiB across 15 classes
pub fn default_size_classes() -> Vec<usize> {
    (0..15).map(|i| 64usize << i).collect()
}

/// Metrics and health check configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,

    /// Address for metrics/health HTTP server
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::SlabCacheError::Config(format!("Failed to read config file: {e}"))
        })?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| crate::SlabCacheError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SLABCACHE_LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(max_conn) = std::env::var("SLABCACHE_MAX_CONNECTIONS")
            && let Ok(n) = max_conn.parse()
        {
            config.server.max_connections = n;
        }

        if let Ok(workers) = std::env::var("SLABCACHE_DISPATCH_WORKERS")
            && let Ok(n) = workers.parse()
        {
            config.server.dispatch_workers = n;
        }

        if let Ok(capacity) = std::env::var("SLABCACHE_ARENA_CAPACITY")
            && let Ok(n) = capacity.parse()
        {
            config.memory.arena_capacity = n;
        }

        if let Ok(addr) = std::env::var("SLABCACHE_METRICS_ADDR") {
            config.metrics.listen_addr = addr;
        }

        if let Ok(enabled) = std::env::var("SLABCACHE_METRICS_ENABLED") {
            config.metrics.enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the storage engine relies on
    pub fn validate(&self) -> crate::Result<()> {
        let mem = &self.memory;

        if mem.page_size == 0 {
            return Err(crate::SlabCacheError::Config(
                "page_size must be non-zero".to_string(),
            ));
        }

        if mem.arena_capacity < mem.page_size {
            return Err(crate::SlabCacheError::Config(format!(
                "arena_capacity {} is smaller than one page ({})",
                mem.arena_capacity, mem.page_size
            )));
        }

        if mem.size_classes.is_empty() {
            return Err(crate::SlabCacheError::Config(
                "size_classes must not be empty".to_string(),
            ));
        }

        if !mem.size_classes.windows(2).all(|w| w[0] < w[1]) {
            return Err(crate::SlabCacheError::Config(
                "size_classes must be strictly ascending".to_string(),
            ));
        }

        if let Some(&largest) = mem.size_classes.last()
            && largest > mem.page_size
        {
            return Err(crate::SlabCacheError::Config(format!(
                "largest size class {} exceeds page_size {}",
                largest, mem.page_size
            )));
        }

        Ok(())
    }

    /// Dispatcher worker count with the 0 = auto rule applied
    pub fn dispatch_workers(&self) -> usize {
        if self.server.dispatch_workers > 0 {
            self.server.dispatch_workers
        } else {
            std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
        }
    }

    /// Connection limit with the minimum applied
    pub fn max_connections(&self) -> usize {
        self.server.max_connections.max(MIN_CONNECTIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size_classes() {
        let classes = default_size_classes();
        assert_eq!(classes.len(), 15);
        assert_eq!(classes[0], 64);
        assert_eq!(classes[14], 1024 * 1024);
        assert!(classes.windows(2).all(|w| w[1] == w[0] * 2));
    }

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_descending_classes() {
        let mut config = Config::default();
        config.memory.size_classes = vec![128, 64];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_class_larger_than_page() {
        let mut config = Config::default();
        config.memory.page_size = 4096;
        config.memory.size_classes = vec![64, 8192];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_arena() {
        let mut config = Config::default();
        config.memory.arena_capacity = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_connections_clamp() {
        let mut config = Config::default();
        config.server.max_connections = 1;
        assert_eq!(config.max_connections(), 5);
        config.server.max_connections = 100;
        assert_eq!(config.max_connections(), 100);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen_addr = "0.0.0.0:5001"
            max_connections = 64

            [memory]
            arena_capacity = 16777216
            size_classes = [64, 256, 1024]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:5001");
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.memory.arena_capacity, 16 * 1024 * 1024);
        assert_eq!(config.memory.size_classes, vec![64, 256, 1024]);
        config.validate().unwrap();
    }
}
