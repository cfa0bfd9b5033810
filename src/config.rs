//! Application paths and environment-driven settings.

use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub memory_db_path: PathBuf,
    pub vector_db_path: PathBuf,
    pub analytics_db_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let user_data_dir = discover_user_data_dir();
        let log_dir = user_data_dir.join("logs");
        let memory_db_path = user_data_dir.join("memory.db");
        let vector_db_path = user_data_dir.join("vectors.db");
        let analytics_db_path = user_data_dir.join("analytics.db");

        for dir in [&user_data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            user_data_dir,
            log_dir,
            memory_db_path,
            vector_db_path,
            analytics_db_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_user_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("STUDYPAL_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(".studypal");
    }

    PathBuf::from(".studypal")
}

/// Runtime settings sourced from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub generator_api_key: Option<String>,
    pub generator_base_url: String,
    pub generator_model: String,
    pub embedding_api_key: Option<String>,
    pub embedding_base_url: String,
    pub embedding_model: String,
    /// How many prior turns the prompt may carry (upper bound on the
    /// per-user preference).
    pub chat_context_window: usize,
    /// Per-owner retention cap for stored conversation turns.
    pub max_chat_history: usize,
    /// Timeout applied to every outbound HTTP call (embedding, generation).
    pub external_call_timeout_secs: u64,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            generator_api_key: non_empty_var("GENERATOR_API_KEY"),
            generator_base_url: env::var("GENERATOR_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai".to_string()),
            generator_model: env::var("GENERATOR_MODEL")
                .unwrap_or_else(|_| "mixtral-8x7b-32768".to_string()),
            embedding_api_key: non_empty_var("EMBEDDING_API_KEY"),
            embedding_base_url: env::var("EMBEDDING_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-ada-002".to_string()),
            chat_context_window: parse_var("CHAT_CONTEXT_WINDOW", 3),
            max_chat_history: parse_var("MAX_CHAT_HISTORY", 50),
            external_call_timeout_secs: parse_var("EXTERNAL_CALL_TIMEOUT_SECS", 30),
            port: parse_var("PORT", 0),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            generator_api_key: None,
            generator_base_url: "https://api.groq.com/openai".to_string(),
            generator_model: "mixtral-8x7b-32768".to_string(),
            embedding_api_key: None,
            embedding_base_url: "http://127.0.0.1:8080".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            chat_context_window: 3,
            max_chat_history: 50,
            external_call_timeout_secs: 30,
            port: 0,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}
