use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZiplineError {
    #[error("archiver service stopped")]
    ServiceStopped,

    #[error("max tasks exceeded")]
    MaxTasksExceeded,

    #[error("task not found")]
    TaskNotFound,

    #[error("task already in progress")]
    TaskInProgress,

    #[error("task already completed")]
    TaskCompleted,

    #[error("no objects to archive")]
    NoObjectsToArchive,

    #[error("shutdown deadline exceeded")]
    ShutdownTimeout,

    #[error("file not found")]
    FileNotFound,

    #[error("incorrect format: {0}")]
    IncorrectFormat(String),

    #[error("bad request")]
    BadRequest,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("access denied")]
    AccessDenied,

    #[error("internal source error")]
    InternalSourceError,

    #[error("redirect with no Location header")]
    RedirectWithoutLocation,

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("archive write failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("worker panicked: {0}")]
    WorkerPanic(String),
}

pub type Result<T> = std::result::Result<T, ZiplineError>;
