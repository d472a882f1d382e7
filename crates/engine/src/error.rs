//! The module contains the error the engine can throw.
//!
//! Business errors carry the numeric context the caller needs to render a
//! precise message:
//!
//! - [`InsufficientBalance`] thrown when a debit does not fit the balance.
//! - [`BelowMinimum`] thrown when an amount is under a configured minimum.
//! - [`AlreadyProcessed`] thrown when a decision is applied twice.
//!
//!  [`InsufficientBalance`]: EngineError::InsufficientBalance
//!  [`BelowMinimum`]: EngineError::BelowMinimum
//!  [`AlreadyProcessed`]: EngineError::AlreadyProcessed
use sea_orm::DbErr;
use thiserror::Error;

use crate::MoneyCents;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: MoneyCents,
        requested: MoneyCents,
    },
    #[error("Amount below minimum: minimum {minimum}, requested {requested}")]
    BelowMinimum {
        minimum: MoneyCents,
        requested: MoneyCents,
    },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("Already processed: {0}")]
    AlreadyProcessed(String),
    #[error("Invalid or expired verification token")]
    ExpiredOrInvalidToken,
    #[error("Conflicting reference: {0}")]
    ConflictingReference(String),
    #[error("Account disabled: {0}")]
    AccountDisabled(String),
    #[error("Plan inactive: {0}")]
    PlanInactive(String),
    #[error("Invalid referrer: {0}")]
    InvalidReferrer(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::InsufficientBalance {
                    available: a1,
                    requested: r1,
                },
                Self::InsufficientBalance {
                    available: a2,
                    requested: r2,
                },
            ) => a1 == a2 && r1 == r2,
            (
                Self::BelowMinimum {
                    minimum: m1,
                    requested: r1,
                },
                Self::BelowMinimum {
                    minimum: m2,
                    requested: r2,
                },
            ) => m1 == m2 && r1 == r2,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::AlreadyProcessed(a), Self::AlreadyProcessed(b)) => a == b,
            (Self::ExpiredOrInvalidToken, Self::ExpiredOrInvalidToken) => true,
            (Self::ConflictingReference(a), Self::ConflictingReference(b)) => a == b,
            (Self::AccountDisabled(a), Self::AccountDisabled(b)) => a == b,
            (Self::PlanInactive(a), Self::PlanInactive(b)) => a == b,
            (Self::InvalidReferrer(a), Self::InvalidReferrer(b)) => a == b,
            (Self::Serialization(a), Self::Serialization(b)) => a == b,
            (Self::Cache(a), Self::Cache(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
