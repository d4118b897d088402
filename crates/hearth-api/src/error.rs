use hearth_db::DbError;
use hearth_types::models::UserId;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("storage failure: {0}")]
    Store(#[from] DbError),

    #[error("recipient {0} does not exist")]
    UnknownRecipient(UserId),
}
