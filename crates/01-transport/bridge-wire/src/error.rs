use thiserror::Error;

use crate::config::ModuleId;

pub type WireResult<T> = Result<T, WireError>;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid module config: {0}")]
    Config(#[from] ConfigError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "queue columns differ in length: {modules} module ids, {methods} method ids, {params} param lists"
    )]
    QueueShape {
        modules: usize,
        methods: usize,
        params: usize,
    },
}

/// Malformed module configuration detected while decoding either wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("module config must be an array or an object keyed by module name")]
    NotAConfig,

    #[error("module {module} must be an array, found {found}")]
    NotATuple { module: ModuleId, found: &'static str },

    #[error("module {module} has {len} fields, expected 1 to 4")]
    WrongArity { module: ModuleId, len: usize },

    #[error("module {module} name must be a string")]
    InvalidName { module: ModuleId },

    #[error("module {module} constants must be an object")]
    InvalidConstants { module: ModuleId },

    #[error("module {module} method list must be an array")]
    MethodsNotArray { module: ModuleId },

    #[error("module {module} method {method} name must be a string")]
    InvalidMethodName { module: ModuleId, method: usize },

    #[error("module {module} declares method {name:?} more than once")]
    DuplicateMethodName { module: ModuleId, name: String },

    #[error("module {module} declares async method {value} which is not a known method id")]
    InvalidAsyncMethod { module: ModuleId, value: String },

    #[error("module id {0} is declared more than once")]
    DuplicateModuleId(ModuleId),

    #[error("module name {0:?} is declared more than once")]
    DuplicateModuleName(String),

    #[error("module {module:?} declares method id {method} more than once")]
    DuplicateMethodId { module: String, method: u32 },

    #[error("id {0} exceeds the lookup table limit")]
    IdOutOfRange(u64),

    #[error("legacy module {module:?}: {message}")]
    Legacy { module: String, message: String },
}

impl ConfigError {
    pub fn legacy(module: &str, message: impl ToString) -> Self {
        ConfigError::Legacy {
            module: module.to_owned(),
            message: message.to_string(),
        }
    }
}
