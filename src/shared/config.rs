use serde::{Deserialize, Serialize};

pub const DEFAULT_POST_LIST_LIMIT: usize = 20;
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 280;
pub const DEFAULT_LOG_FILTER: &str = "chirp=debug,info";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub posts: PostConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// 投稿一覧として取得する件数（新しい順）
    pub post_list_limit: usize,
    /// 無効化されたキーをバックグラウンドで再取得するか
    pub auto_refetch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostConfig {
    pub max_message_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                post_list_limit: DEFAULT_POST_LIST_LIMIT,
                auto_refetch: true,
            },
            posts: PostConfig {
                max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            },
            logging: LoggingConfig {
                filter: DEFAULT_LOG_FILTER.to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Some(value) = env_usize("CHIRP_POST_LIST_LIMIT") {
            cfg.cache.post_list_limit = value.max(1);
        }
        if let Ok(v) = std::env::var("CHIRP_AUTO_REFETCH") {
            cfg.cache.auto_refetch = parse_bool(&v, cfg.cache.auto_refetch);
        }
        if let Some(value) = env_usize("CHIRP_MAX_MESSAGE_CHARS") {
            cfg.posts.max_message_chars = value;
        }
        if let Ok(v) = std::env::var("CHIRP_LOG_FILTER") {
            let filter = v.trim();
            if !filter.is_empty() {
                cfg.logging.filter = filter.to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cache.post_list_limit == 0 {
            return Err("Cache post_list_limit must be greater than 0".to_string());
        }
        if self.posts.max_message_chars == 0 {
            return Err("Posts max_message_chars must be greater than 0".to_string());
        }
        if self.logging.filter.trim().is_empty() {
            return Err("Logging filter must not be empty".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| parse_usize(&v))
}
