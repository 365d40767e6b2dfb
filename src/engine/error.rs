use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// A field that is fixed at creation was changed on save.
    ImmutableField(&'static str),
    InvalidMode(u8),
    InvalidTransition(&'static str),
    InvalidInterval {
        beginning: NaiveDate,
        end: NaiveDate,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Configuration errors the caller caused, as opposed to missing records or I/O.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            EngineError::ImmutableField(_) | EngineError::InvalidMode(_) | EngineError::InvalidTransition(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::ImmutableField(field) => {
                write!(f, "{field} cannot be changed after the schedule was created")
            }
            EngineError::InvalidMode(mode) => write!(f, "invalid regeneration mode: {mode}"),
            EngineError::InvalidTransition(msg) => write!(f, "invalid duty switch transition: {msg}"),
            EngineError::InvalidInterval { beginning, end } => {
                write!(f, "interval ends on {end}, before it begins on {beginning}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
