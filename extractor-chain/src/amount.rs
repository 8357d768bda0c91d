//! A strongly-typed satoshi amount.
//!
//! Bitcoin amounts are signed 64-bit integers on the wire, but outputs and
//! balances can never be negative. `Amount<C>` carries that distinction in
//! the type system via a zero-sized constraint marker, the same way block
//! heights and hashes are newtypes rather than bare integers.

use std::{io, marker::PhantomData};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The maximum number of satoshis that will ever exist (21 million BTC).
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Marker for amounts that may be negative (e.g. fee deltas).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NegativeAllowed;

/// Marker for amounts that must be non-negative (e.g. output values).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NonNegative;

pub trait Constraint {
    fn validate(value: i64) -> Result<(), AmountError>;
}

impl Constraint for NegativeAllowed {
    fn validate(value: i64) -> Result<(), AmountError> {
        if value.abs() > MAX_MONEY {
            return Err(AmountError::OutOfRange(value));
        }
        Ok(())
    }
}

impl Constraint for NonNegative {
    fn validate(value: i64) -> Result<(), AmountError> {
        if value < 0 || value > MAX_MONEY {
            return Err(AmountError::OutOfRange(value));
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum AmountError {
    #[error("amount {0} is negative or exceeds the maximum possible supply")]
    OutOfRange(i64),
}

/// An amount of satoshis, constrained by `C` to either allow or disallow negative values.
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Amount<C = NegativeAllowed>(i64, PhantomData<C>);

impl<C: Constraint> Amount<C> {
    pub fn zero() -> Self {
        Amount(0, PhantomData)
    }

    pub fn try_new(value: i64) -> Result<Self, AmountError> {
        C::validate(value)?;
        Ok(Amount(value, PhantomData))
    }
}

impl<C> Amount<C> {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl<C> std::fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl<C> BitcoinSerialize for Amount<C> {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl<C: Constraint> BitcoinDeserialize for Amount<C> {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = i64::bitcoin_deserialize(reader)?;
        C::validate(raw).map_err(|_| SerializationError::Parse("amount out of range"))?;
        Ok(Amount(raw, PhantomData))
    }
}
