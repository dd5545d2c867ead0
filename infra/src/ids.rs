use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use err_derive::Error;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A row identifier, tagged with the entity it refers to so that ids of
/// different tables cannot be mixed up. Parsed ids are never negative.
pub struct Id<T> {
    val: i32,
    phantom: PhantomData<T>,
}

#[derive(Debug, Clone, Error)]
#[error(display = "Unparseable Id: {:?}", _0)]
pub struct IdParseError(String);

pub trait Entity {
    const PREFIX: &'static str;
}

impl<T> Id<T> {
    pub fn from_raw(val: i32) -> Self {
        Id {
            val,
            phantom: PhantomData,
        }
    }

    pub fn raw(&self) -> i32 {
        self.val
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.val)
    }
}

impl<T: Entity> fmt::Debug for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}#{}", T::PREFIX, self.val)
    }
}

impl<T> std::str::FromStr for Id<T> {
    type Err = IdParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let val = src
            .parse::<u32>()
            .ok()
            .and_then(|val| i32::try_from(val).ok())
            .ok_or_else(|| IdParseError(src.to_string()))?;
        Ok(Id::from_raw(val))
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.val.cmp(&other.val)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.val.hash(state)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.val)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let val = u32::deserialize(deserializer)?;
        let val = i32::try_from(val).map_err(D::Error::custom)?;
        Ok(Id::from_raw(val))
    }
}
