use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Parse float error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("Parse integer error: {0}")]
    ParseBigInt(#[from] num_bigint::ParseBigIntError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("Contract error: {0}")]
    Contract(
        #[from]
        ethers::contract::ContractError<ethers::providers::Provider<ethers::providers::Http>>,
    ),

    #[error("Wallet error: {0}")]
    Wallet(#[from] ethers::signers::WalletError),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Price oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Transaction rejected: {reason}")]
    SubmissionRejected { reason: String },

    #[error("Transaction transport error: {0}")]
    SubmissionTransport(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A transaction is already being submitted")]
    SubmissionInFlight,

    #[error("Market data has not been loaded yet")]
    NotReady,

    #[error("No account connected")]
    NoAccount,
}

/// Reasons a position input is refused. Checked in declaration order.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("The Looper has a limit of {limit} ETH per transaction.")]
    ExceedsTransactionLimit { limit: f64 },

    #[error(
        "Wrong value. ETH must be at least {min_eth} and rate must be between {min_percent}% and {max_percent}%"
    )]
    OutOfRange {
        min_eth: f64,
        min_percent: f64,
        max_percent: f64,
    },

    #[error("Not enough ETH: have {available}, need {required}")]
    InsufficientBalance { available: f64, required: f64 },
}
