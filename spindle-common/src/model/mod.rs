pub mod community;
pub mod post;
pub mod user;
pub mod view;

use crate::{
    model::{post::InvalidPostTextError, user::InvalidUserHandleError},
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

/// A stored or submitted value broke a model invariant.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    UserHandle(#[from] InvalidUserHandleError),
    #[error(transparent)]
    PostText(#[from] InvalidPostTextError),
}

/// Ids count milliseconds from the start of 2025.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SpindleEpoch;
impl Epoch for SpindleEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type SpindleSnowflake = Snowflake<SpindleEpoch>;
pub type SpindleSnowflakeGenerator = SnowflakeGenerator<SpindleEpoch>;

/// A snowflake tagged with the kind of entity it identifies, so a post id
/// cannot be passed where a user id is expected.
///
/// Serialized as the bare number.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(SpindleSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Reads an id stored bit-for-bit in a signed 64-bit column.
    #[must_use]
    pub fn from_signed(value: i64) -> Self {
        value.cast_unsigned().into()
    }

    /// The same bits as an `i64`, for columns without an unsigned type.
    /// Ids past `i64::MAX` come out negative and read back unchanged.
    #[must_use]
    pub fn to_signed(self) -> i64 {
        self.get().cast_signed()
    }

    /// When the id was generated, to the millisecond.
    #[must_use]
    pub fn minted_at(self) -> UtcDateTime {
        self.0.timestamp().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<SpindleSnowflake> for Id<Marker> {
    fn from(value: SpindleSnowflake) -> Self {
        Self(value, PhantomData)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        SpindleSnowflake::new(value).into()
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.get()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{Id, SpindleEpoch, SpindleSnowflakeGenerator, post::PostMarker},
        snowflake::{Epoch, ProcessId, WorkerId},
    };
    use time::{Duration, macros::utc_datetime};

    #[test]
    fn signed_form_keeps_every_bit() {
        let high: Id<PostMarker> = u64::MAX.into();
        assert_eq!(high.to_signed(), -1);
        assert_eq!(Id::<PostMarker>::from_signed(-1), high);

        let low: Id<PostMarker> = 42.into();
        assert_eq!(low.to_signed(), 42);
        assert_eq!(Id::<PostMarker>::from_signed(42), low);
    }

    #[test]
    fn ids_remember_when_they_were_minted() {
        let at = utc_datetime!(2025-06-01 12:30:15.250);
        let mut generator = SpindleSnowflakeGenerator::new(WorkerId::default(), ProcessId::default());
        let id: Id<PostMarker> = generator.generate_at(at).unwrap().into();

        assert_eq!(id.minted_at(), at);
        assert_eq!(
            Id::<PostMarker>::from(0).minted_at(),
            SpindleEpoch::EPOCH_TIME
        );
        assert!(id.minted_at() - SpindleEpoch::EPOCH_TIME > Duration::days(150));
    }

    #[test]
    fn serializes_as_a_plain_number() {
        let id: Id<PostMarker> = 1234.into();
        assert_eq!(serde_json::to_string(&id).unwrap(), "1234");
        assert_eq!(serde_json::from_str::<Id<PostMarker>>("1234").unwrap(), id);
    }
}
