//! Lenient deserializers for values that may arrive as strings.
//!
//! Environment variables reach serde as strings, numbers or booleans depending
//! on how figment reads them, so these accept all three and defer to the
//! option parsers for the string forms.

use crate::options::{parse_boolean_state, parse_positive_integer};
use serde::Deserializer;
use serde::de::{self, Visitor};
use std::fmt;

struct BooleanState;

impl<'de> Visitor<'de> for BooleanState {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean state such as true, yes, on, 1, false, no, off or 0")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
        match v {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(E::custom(format!("invalid boolean state value {v}"))),
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::custom(format!("invalid boolean state value {v}"))),
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
        parse_boolean_state(v.trim()).map_err(E::custom)
    }
}

pub fn boolean_state<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    deserializer.deserialize_any(BooleanState)
}

struct Jobs;

impl<'de> Visitor<'de> for Jobs {
    type Value = Option<usize>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a positive worker count, 0 or an empty string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Option<usize>, E> {
        let jobs = usize::try_from(v).map_err(E::custom)?;
        Ok((jobs > 0).then_some(jobs))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Option<usize>, E> {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::custom(format!("expect integer value to be positive, got {v}"))),
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Option<usize>, E> {
        match v.trim() {
            "0" => Ok(None),
            trimmed => parse_positive_integer(trimmed).map_err(E::custom),
        }
    }

    fn visit_none<E: de::Error>(self) -> Result<Option<usize>, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Option<usize>, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Option<usize>, D::Error> {
        deserializer.deserialize_any(self)
    }
}

pub fn jobs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    deserializer.deserialize_any(Jobs)
}
