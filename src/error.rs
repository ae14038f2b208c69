use thiserror::Error;

/// Domain errors raised by the simulation core.
///
/// Precondition failures are local and leave no state change behind;
/// everything else maps onto a recovery path in the controller.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("no eligible runway available for flight {flight}")]
    ResourceUnavailable { flight: String },

    #[error("ground fault on aircraft {0}")]
    ExternalFault(String),

    #[error("speed compliance violation: {0}")]
    Compliance(String),

    #[error("ipc transport error: {0}")]
    IpcTransport(#[from] std::io::Error),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl SimError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        SimError::Precondition(msg.into())
    }
}

pub type SimResult<T> = Result<T, SimError>;
