use cohort_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Authentication error")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("Message not found")]
    NotFound,
    #[error("Target user is not online")]
    TargetOffline,
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

impl GatewayError {
    /// Body for a failed ack frame.
    pub fn ack(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "message": self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_body_carries_message() {
        let err = GatewayError::Forbidden("Room not allowed".into());
        let body = err.ack();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Room not allowed");
    }
}
