use thiserror::Error;

use mangawiki_shared::FetchError;
use mangawiki_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Chapter tolerance {value} exceeds the last chapter ({max})")]
    InvalidTolerance { value: u32, max: u32 },

    #[error("Username must not be empty")]
    EmptyUsername,

    #[error("Not signed in")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, ClientError>;
