use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    /// access token 有效期（秒）
    #[serde(default = "default_access_token_expires_in")]
    pub access_token_expires_in: i64,
}

fn default_access_token_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Stripe 兼容网关地址
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// 是否允许 `test` 支付方式（仅开发 / 测试环境）
    #[serde(default)]
    pub allow_test_payments: bool,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            gateway_base_url: default_gateway_base_url(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            currency: default_currency(),
            allow_test_payments: false,
        }
    }
}

fn default_gateway_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// 延迟任务轮询间隔（秒）
    #[serde(default = "default_job_poll_secs")]
    pub job_poll_secs: u64,
    /// 每轮最多处理的任务数
    #[serde(default = "default_job_batch_size")]
    pub job_batch_size: u64,
    /// 积分过期扫描间隔（秒）
    #[serde(default = "default_points_expiry_secs")]
    pub points_expiry_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            job_poll_secs: default_job_poll_secs(),
            job_batch_size: default_job_batch_size(),
            points_expiry_secs: default_points_expiry_secs(),
        }
    }
}

fn default_job_poll_secs() -> u64 {
    30
}

fn default_job_batch_size() -> u64 {
    50
}

fn default_points_expiry_secs() -> u64 {
    3600
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("Failed to parse config file: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // 数据库 URL 在无配置文件时必须提供
                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is not set and config.toml was not found")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                        access_token_expires_in: get_env_parse(
                            "JWT_ACCESS_EXPIRES_IN",
                            default_access_token_expires_in(),
                        ),
                    },
                    payment: PaymentConfig {
                        gateway_base_url: get_env("PAYMENT_GATEWAY_BASE_URL")
                            .unwrap_or_else(default_gateway_base_url),
                        secret_key: get_env("PAYMENT_SECRET_KEY").unwrap_or_default(),
                        webhook_secret: get_env("PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
                        currency: get_env("PAYMENT_CURRENCY").unwrap_or_else(default_currency),
                        allow_test_payments: get_env_parse("ALLOW_TEST_PAYMENTS", false),
                    },
                    tasks: TasksConfig {
                        job_poll_secs: get_env_parse("JOB_POLL_SECS", default_job_poll_secs()),
                        job_batch_size: get_env_parse("JOB_BATCH_SIZE", default_job_batch_size()),
                        points_expiry_secs: get_env_parse(
                            "POINTS_EXPIRY_SECS",
                            default_points_expiry_secs(),
                        ),
                    },
                }
            }
            Err(e) => {
                return Err(format!("Failed to read config file {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            config.jwt.secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            config.jwt.access_token_expires_in = n;
        }
        if let Ok(v) = env::var("PAYMENT_GATEWAY_BASE_URL") {
            config.payment.gateway_base_url = v;
        }
        if let Ok(v) = env::var("PAYMENT_SECRET_KEY") {
            config.payment.secret_key = v;
        }
        if let Ok(v) = env::var("PAYMENT_WEBHOOK_SECRET") {
            config.payment.webhook_secret = v;
        }
        if let Ok(v) = env::var("PAYMENT_CURRENCY") {
            config.payment.currency = v;
        }
        if let Ok(v) = env::var("ALLOW_TEST_PAYMENTS")
            && let Ok(b) = v.parse()
        {
            config.payment.allow_test_payments = b;
        }
        if let Ok(v) = env::var("JOB_POLL_SECS")
            && let Ok(n) = v.parse()
        {
            config.tasks.job_poll_secs = n;
        }
        if let Ok(v) = env::var("JOB_BATCH_SIZE")
            && let Ok(n) = v.parse()
        {
            config.tasks.job_batch_size = n;
        }
        if let Ok(v) = env::var("POINTS_EXPIRY_SECS")
            && let Ok(n) = v.parse()
        {
            config.tasks.points_expiry_secs = n;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml_uses_section_defaults() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [database]
            url = "postgres://localhost/marketplace"
            max_connections = 5

            [jwt]
            secret = "s3cret"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.payment.currency, "usd");
        assert!(!config.payment.allow_test_payments);
        assert_eq!(config.tasks.job_poll_secs, 30);
        assert_eq!(config.jwt.access_token_expires_in, 3600);
    }
}
