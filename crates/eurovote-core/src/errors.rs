/// Core error type.
///
/// Adapter crates map their transport errors into this type. The notification
/// tracker never surfaces these to its callers; they end up in the logs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {status}: {body}")]
    Http { status: u16, body: String },

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
