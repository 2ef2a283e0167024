use crate::error::AppError;
use crate::logging::LogFormat;
use dotenvy::dotenv;
use std::env;

/// Page sizes applied when a caller does not ask for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDefaults {
    pub conversation_page_size: u32,
    pub message_page_limit: u32,
}

impl Default for PageDefaults {
    fn default() -> Self {
        Self {
            conversation_page_size: 10,
            message_page_limit: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub db_max_connections: u32,
    pub event_channel_capacity: usize,
    pub log_format: LogFormat,
    pub pages: PageDefaults,
}

impl Config {
    fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
        match env::var(name) {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{name} is not a valid number"))),
            _ => Ok(default),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url =
            env::var("DATABASE_URL").map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let db_max_connections = Self::parse_var("DB_MAX_CONNECTIONS", 10u32)?;
        let event_channel_capacity = Self::parse_var("EVENT_CHANNEL_CAPACITY", 256usize)?;
        let log_format = env::var("LOG_FORMAT")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| raw.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        let defaults = PageDefaults::default();
        let pages = PageDefaults {
            conversation_page_size: Self::parse_var(
                "CONVERSATION_PAGE_SIZE",
                defaults.conversation_page_size,
            )?,
            message_page_limit: Self::parse_var("MESSAGE_PAGE_LIMIT", defaults.message_page_limit)?,
        };
        if pages.conversation_page_size == 0 || pages.message_page_limit == 0 {
            return Err(AppError::Config("page sizes must be positive".into()));
        }
        if event_channel_capacity == 0 {
            return Err(AppError::Config(
                "EVENT_CHANNEL_CAPACITY must be positive".into(),
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            db_max_connections,
            event_channel_capacity,
            log_format,
            pages,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/conversation_ledger_test".into(),
            redis_url: None,
            db_max_connections: 5,
            event_channel_capacity: 64,
            log_format: LogFormat::Text,
            pages: PageDefaults::default(),
        }
    }
}
