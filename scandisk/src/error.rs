use thiserror::Error;

/// Conditions that stop a check. Per-chain problems (broken or cross-linked
/// chains) are not errors; they are recorded on the report and repaired in
/// place.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("image I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("root directory is full, {unrecovered} lost cluster run(s) left unrecovered")]
    RootDirectoryFull { unrecovered: usize },
}

pub type CheckResult<T = ()> = Result<T, CheckError>;
