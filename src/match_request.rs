use crate::errors::{MatchError, MatchResult};
use crate::feature_schema::{BodyStyle, MAX_STAR_RATING, SENTIMENT_RANGE};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Raw signals for one scoring call, as assembled by the caller from the
/// vehicle record, review aggregates and the user's stated preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub car_price: f64,
    pub user_budget: f64,
    pub car_mpg: f64,
    pub desired_mpg: f64,

    pub avg_star_rating: f64, // 0-5
    pub avg_sentiment: f64,   // -1..1
    #[serde(deserialize_with = "integral")]
    pub num_reviews: u64,

    pub prefer_new: f64,  // 0-1
    pub prefer_used: f64, // 0-1

    #[serde(deserialize_with = "integral")]
    pub body_sedan: u8, // 0/1
    #[serde(deserialize_with = "integral")]
    pub body_suv: u8, // 0/1
}

impl MatchRequest {
    /// Parse a request from an untyped JSON payload.
    ///
    /// Missing fields and wrong types surface as validation errors rather
    /// than serialization errors, so the routing layer can reject them as
    /// client mistakes. Unknown fields are ignored.
    pub fn from_value(value: serde_json::Value) -> MatchResult<Self> {
        serde_json::from_value(value).map_err(|e| MatchError::validation("request", e.to_string()))
    }

    /// Indicator value for a body style slot.
    pub fn body_indicator(&self, style: BodyStyle) -> u8 {
        match style {
            BodyStyle::Sedan => self.body_sedan,
            BodyStyle::Suv => self.body_suv,
        }
    }

    /// Check finiteness and declared ranges of every field.
    ///
    /// `user_budget` and `desired_mpg` are only required to be finite: the
    /// gap features floor their denominators, and a non-positive value is
    /// the caller's responsibility.
    pub fn validate(&self) -> MatchResult<()> {
        require_finite("car_price", self.car_price)?;
        require_finite("user_budget", self.user_budget)?;
        require_finite("car_mpg", self.car_mpg)?;
        require_finite("desired_mpg", self.desired_mpg)?;
        require_finite("avg_star_rating", self.avg_star_rating)?;
        require_finite("avg_sentiment", self.avg_sentiment)?;
        require_finite("prefer_new", self.prefer_new)?;
        require_finite("prefer_used", self.prefer_used)?;

        if self.car_price < 0.0 {
            return Err(MatchError::validation("car_price", "must not be negative"));
        }
        if self.car_mpg < 0.0 {
            return Err(MatchError::validation("car_mpg", "must not be negative"));
        }

        require_range("avg_star_rating", self.avg_star_rating, 0.0, MAX_STAR_RATING)?;
        require_range(
            "avg_sentiment",
            self.avg_sentiment,
            SENTIMENT_RANGE.0,
            SENTIMENT_RANGE.1,
        )?;
        require_range("prefer_new", self.prefer_new, 0.0, 1.0)?;
        require_range("prefer_used", self.prefer_used, 0.0, 1.0)?;

        for style in BodyStyle::ALL {
            if self.body_indicator(style) > 1 {
                return Err(MatchError::validation(
                    style.field_name(),
                    "body style indicator must be 0 or 1",
                ));
            }
        }

        if self.user_budget <= 0.0 || self.desired_mpg <= 0.0 {
            tracing::debug!(
                user_budget = self.user_budget,
                desired_mpg = self.desired_mpg,
                "non-positive gap denominator, floor applies"
            );
        }

        Ok(())
    }
}

/// Counts and indicators accept integral floats such as `50.0` or `1.0`,
/// which clients that serialize every number as a float send.
fn integral<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    struct IntegralVisitor<T>(PhantomData<T>);

    impl<T: TryFrom<u64>> IntegralVisitor<T> {
        fn narrow<E: de::Error>(value: u64) -> Result<T, E> {
            T::try_from(value).map_err(|_| {
                E::invalid_value(de::Unexpected::Unsigned(value), &"a value in range")
            })
        }
    }

    impl<T: TryFrom<u64>> Visitor<'_> for IntegralVisitor<T> {
        type Value = T;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<T, E> {
            Self::narrow(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<T, E> {
            let value = u64::try_from(value)
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))?;
            Self::narrow(value)
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<T, E> {
            if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64
            {
                Self::narrow(value as u64)
            } else {
                Err(E::invalid_value(de::Unexpected::Float(value), &self))
            }
        }
    }

    deserializer.deserialize_any(IntegralVisitor(PhantomData))
}

fn require_finite(field: &str, value: f64) -> MatchResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MatchError::validation(field, "must be a finite number"))
    }
}

fn require_range(field: &str, value: f64, min: f64, max: f64) -> MatchResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(MatchError::validation(
            field,
            format!("{value} is outside [{min}, {max}]"),
        ))
    }
}
