use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::skill_rule::{RuleCondition, SkillRule};

/// Main configuration structure for Vigil
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Agent socket transport
    #[serde(default)]
    pub transport: TransportConfig,

    /// Agent registry and liveness sweep
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Per-component circuit breakers
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Health validation stage
    #[serde(default)]
    pub health_validation: HealthValidationConfig,

    /// Skill routing stage
    #[serde(default)]
    pub skill_routing: SkillRoutingConfig,

    /// Supervisor scoring and fallback
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Condition-to-agent activation rules
    #[serde(default = "default_skill_rules")]
    pub skill_rules: Vec<SkillRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            transport: TransportConfig::default(),
            registry: RegistryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health_validation: HealthValidationConfig::default(),
            skill_routing: SkillRoutingConfig::default(),
            supervisor: SupervisorConfig::default(),
            skill_rules: default_skill_rules(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stderr only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Unix socket transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransportConfig {
    /// Path of the listening socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Consecutive malformed frames tolerated before a connection is closed
    #[serde(default = "default_max_parse_failures")]
    pub max_parse_failures: u32,

    /// Longest accepted frame in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Outbound queue depth per connection
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/vigil-agents.sock")
}

const fn default_max_parse_failures() -> u32 {
    5
}

const fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

const fn default_outbound_buffer() -> usize {
    64
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_parse_failures: default_max_parse_failures(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Agent registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RegistryConfig {
    /// Silence after which an agent is marked degraded
    #[serde(default = "default_heartbeat_grace_ms")]
    pub heartbeat_grace_ms: u64,

    /// Silence after which an agent is marked unhealthy
    #[serde(default = "default_unhealthy_after_ms")]
    pub unhealthy_after_ms: u64,

    /// Interval of the liveness sweep
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Timeout applied to tasks built by the dispatcher
    #[serde(default = "default_task_timeout_ms")]
    pub default_task_timeout_ms: u64,

    /// Weight of the newest sample in the latency moving average (0-1]
    #[serde(default = "default_latency_smoothing")]
    pub latency_smoothing: f64,
}

const fn default_heartbeat_grace_ms() -> u64 {
    30_000
}

const fn default_unhealthy_after_ms() -> u64 {
    90_000
}

const fn default_sweep_interval_ms() -> u64 {
    10_000
}

const fn default_task_timeout_ms() -> u64 {
    120_000
}

const fn default_latency_smoothing() -> f64 {
    0.3
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_grace_ms: default_heartbeat_grace_ms(),
            unhealthy_after_ms: default_unhealthy_after_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            default_task_timeout_ms: default_task_timeout_ms(),
            latency_smoothing: default_latency_smoothing(),
        }
    }
}

/// Configuration for circuit breakers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerConfig {
    /// Number of failures within the monitoring period that opens the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an open circuit stays open before trial calls are allowed.
    #[serde(default = "default_open_timeout_ms")]
    pub timeout_ms: u64,

    /// Trial calls allowed while half-open; all must succeed to close.
    #[serde(default = "default_half_open_requests")]
    pub half_open_requests: u32,

    /// Window size for counting failures (older failures are forgotten).
    #[serde(default = "default_monitoring_period_ms")]
    pub monitoring_period_ms: u64,

    /// Whether to enable circuit breakers.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_open_timeout_ms() -> u64 {
    60_000
}

const fn default_half_open_requests() -> u32 {
    3
}

const fn default_monitoring_period_ms() -> u64 {
    300_000
}

const fn default_true() -> bool {
    true
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_ms: default_open_timeout_ms(),
            half_open_requests: default_half_open_requests(),
            monitoring_period_ms: default_monitoring_period_ms(),
            enabled: true,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.timeout_ms).unwrap_or(i64::MAX))
    }

    pub fn monitoring_period(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(
            i64::try_from(self.monitoring_period_ms).unwrap_or(i64::MAX),
        )
    }
}

/// Health validation stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthValidationConfig {
    /// Fewer healthy agents than this is a critical issue
    #[serde(default = "default_minimum_healthy_agents")]
    pub minimum_healthy_agents: usize,

    /// Average latency (ms) above which a healthy agent is flagged slow
    #[serde(default = "default_max_response_time")]
    pub max_response_time: u64,

    /// Agents whose absence is a critical issue
    #[serde(default = "default_required_agents")]
    pub required_agents: Vec<String>,

    /// Failed-task count at which an agent is flagged as close to tripping
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u64,
}

const fn default_minimum_healthy_agents() -> usize {
    2
}

const fn default_max_response_time() -> u64 {
    30_000
}

fn default_required_agents() -> Vec<String> {
    vec!["quality".to_string()]
}

const fn default_circuit_breaker_threshold() -> u64 {
    5
}

impl Default for HealthValidationConfig {
    fn default() -> Self {
        Self {
            minimum_healthy_agents: default_minimum_healthy_agents(),
            max_response_time: default_max_response_time(),
            required_agents: default_required_agents(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
        }
    }
}

/// Line/file counts above which a change is routed to the architecture agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArchitectureThresholds {
    #[serde(default = "default_loc_threshold")]
    pub loc_changed: u64,
    #[serde(default = "default_files_threshold")]
    pub files_count: u64,
}

const fn default_loc_threshold() -> u64 {
    500
}

const fn default_files_threshold() -> u64 {
    20
}

impl Default for ArchitectureThresholds {
    fn default() -> Self {
        Self {
            loc_changed: default_loc_threshold(),
            files_count: default_files_threshold(),
        }
    }
}

/// Skill routing stage configuration
///
/// Pattern lists are case-insensitive regular expressions matched against
/// changed file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SkillRoutingConfig {
    #[serde(default = "default_default_agents")]
    pub default_agents: Vec<String>,

    #[serde(default = "default_security_patterns")]
    pub security_sensitive_patterns: Vec<String>,

    #[serde(default = "default_api_patterns")]
    pub api_change_patterns: Vec<String>,

    #[serde(default = "default_documentation_patterns")]
    pub documentation_patterns: Vec<String>,

    #[serde(default = "default_config_patterns")]
    pub config_patterns: Vec<String>,

    #[serde(default = "default_test_patterns")]
    pub test_patterns: Vec<String>,

    /// Exact file names treated as dependency lockfiles
    #[serde(default = "default_lockfile_names")]
    pub lockfile_names: Vec<String>,

    #[serde(default)]
    pub architecture_change_thresholds: ArchitectureThresholds,

    /// Changes below this many lines lower the request priority
    #[serde(default = "default_small_change_loc")]
    pub small_change_loc: u64,
}

fn default_default_agents() -> Vec<String> {
    vec!["quality".to_string()]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Matches `word` as a whole path component, or as the leading word of a
/// snake, kebab, dotted or camelCase name (`auth_service`, `authService`),
/// but not as a prefix of a longer word (`author`, `tokenizer`).
fn name_word(word: &str) -> String {
    format!(r"(^|[/_.-])({word})([/_.-]|(?-i:[A-Z])|$)")
}

fn default_security_patterns() -> Vec<String> {
    let mut patterns = strings(&[
        r"(^|/)package(-lock)?\.json$",
        r"(^|/)(yarn\.lock|pnpm-lock\.yaml|Cargo\.(toml|lock)|go\.(mod|sum)|Gemfile(\.lock)?|requirements[^/]*\.txt)$",
        r"(^|/)\.env",
        r"(^|/)Dockerfile$",
    ]);
    patterns.extend(
        [
            r"o?auth[nz]?|authenticat(e|ion|or)s?|authori[sz](e|ation|er)s?",
            "security",
            "crypto(graphy)?",
            "passwords?",
            "secrets?",
            "tokens?|jwt",
            "permissions?",
        ]
        .into_iter()
        .map(name_word),
    );
    patterns
}

fn default_api_patterns() -> Vec<String> {
    strings(&[
        r"openapi",
        r"swagger",
        r"(^|/)routes?(/|\.|$)",
        r"controller",
        r"(^|/)api/",
    ])
}

fn default_documentation_patterns() -> Vec<String> {
    strings(&[r"\.mdx?$", r"\.rst$", r"(^|/)docs?/", r"(^|/)README", r"(^|/)CHANGELOG"])
}

fn default_config_patterns() -> Vec<String> {
    strings(&[
        r"\.ya?ml$",
        r"\.toml$",
        r"\.ini$",
        r"\.cfg$",
        r"(^|/)\.env",
        r"\.config\.(js|cjs|mjs|ts)$",
        r"(^|/)tsconfig[^/]*\.json$",
    ])
}

fn default_test_patterns() -> Vec<String> {
    strings(&[r"(^|/)tests?/", r"_test\.", r"\.test\.", r"\.spec\."])
}

fn default_lockfile_names() -> Vec<String> {
    strings(&[
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "Cargo.lock",
        "Gemfile.lock",
        "poetry.lock",
        "go.sum",
        "composer.lock",
    ])
}

const fn default_small_change_loc() -> u64 {
    10
}

impl Default for SkillRoutingConfig {
    fn default() -> Self {
        Self {
            default_agents: default_default_agents(),
            security_sensitive_patterns: default_security_patterns(),
            api_change_patterns: default_api_patterns(),
            documentation_patterns: default_documentation_patterns(),
            config_patterns: default_config_patterns(),
            test_patterns: default_test_patterns(),
            lockfile_names: default_lockfile_names(),
            architecture_change_thresholds: ArchitectureThresholds::default(),
            small_change_loc: default_small_change_loc(),
        }
    }
}

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Agents preferred by the fallback path, in order
    #[serde(default = "default_fallback_agents")]
    pub fallback_agents: Vec<String>,

    /// Changes above this many lines get a "split the change" recommendation
    #[serde(default = "default_split_change_loc")]
    pub split_change_loc: u64,
}

fn default_fallback_agents() -> Vec<String> {
    vec!["quality".to_string(), "security".to_string()]
}

const fn default_split_change_loc() -> u64 {
    1000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            fallback_agents: default_fallback_agents(),
            split_change_loc: default_split_change_loc(),
        }
    }
}

/// Rules shipped with the default configuration
pub fn default_skill_rules() -> Vec<SkillRule> {
    vec![
        SkillRule::new(
            "dependency-update",
            RuleCondition::parse("lockfile_touched").unwrap_or(RuleCondition::Always),
            &["security"],
            8,
        ),
        SkillRule::new(
            "large-change",
            RuleCondition::parse("lines_changed > 1000 || files_changed > 30")
                .unwrap_or(RuleCondition::Always),
            &["architecture", "performance"],
            7,
        ),
        SkillRule::new(
            "api-surface",
            RuleCondition::parse("api_touched").unwrap_or(RuleCondition::Always),
            &["documentation", "quality"],
            6,
        ),
    ]
}
