pub use crate::model::*;

use miette::Diagnostic;
use std::fmt::Display;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("client error: {0}")]
    ClientError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("datum decode error: {0}")]
    DecodeError(String),

    #[error("intersection not found")]
    IntersectionNotFound,

    #[error("exceeded maximal rollback length - is the node synced?")]
    ExceededRollback,

    #[error("missing inputs for tx {0}")]
    MissingInputs(String),

    #[error("price oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("utxo fallback unavailable: {0}")]
    FallbackUnavailable(String),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn config(text: impl Display) -> Error {
        Error::ConfigError(text.to_string())
    }

    pub fn client(error: impl Display) -> Error {
        Error::ClientError(error.to_string())
    }

    pub fn parse(error: impl Display) -> Error {
        Error::ParseError(error.to_string())
    }

    pub fn server(error: impl Display) -> Error {
        Error::ServerError(error.to_string())
    }

    pub fn decode(error: impl Display) -> Error {
        Error::DecodeError(error.to_string())
    }

    pub fn message(text: impl Into<String>) -> Error {
        Error::Message(text.into())
    }
}
