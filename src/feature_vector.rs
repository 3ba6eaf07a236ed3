use crate::errors::MatchResult;
use crate::feature_schema::{
    feature_index, BodyStyle, FEATURE_COUNT, GAP_DENOMINATOR_FLOOR, MAX_STAR_RATING,
};
use crate::match_request::MatchRequest;

/// Fixed-length, ordered model input built from one request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named feature.
    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).and_then(|i| self.values.get(i).copied())
    }

    /// Values narrowed to `f32` for the training backend.
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|v| *v as f32).collect()
    }
}

/// Relative gap with a floored denominator.
fn relative_gap(actual: f64, target: f64) -> f64 {
    (actual - target) / target.max(GAP_DENOMINATOR_FLOOR)
}

/// Build the model input for a request.
///
/// This is the only place raw signals become features, and both the
/// trainer and the scoring service call it.
pub fn build_feature_vector(req: &MatchRequest) -> MatchResult<FeatureVector> {
    req.validate()?;

    let mut values = Vec::with_capacity(FEATURE_COUNT);
    values.push(relative_gap(req.car_price, req.user_budget));
    values.push(relative_gap(req.car_mpg, req.desired_mpg));
    values.push(req.avg_star_rating / MAX_STAR_RATING);
    values.push((req.avg_sentiment + 1.0) / 2.0);
    values.push((req.num_reviews as f64).ln_1p());
    values.push(req.prefer_new);
    values.push(req.prefer_used);
    for style in BodyStyle::ALL {
        values.push(f64::from(req.body_indicator(style)));
    }

    debug_assert_eq!(values.len(), FEATURE_COUNT);
    Ok(FeatureVector { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MatchError;

    fn scenario_a() -> MatchRequest {
        MatchRequest {
            car_price: 25000.0,
            user_budget: 20000.0,
            car_mpg: 30.0,
            desired_mpg: 35.0,
            avg_star_rating: 4.5,
            avg_sentiment: 0.6,
            num_reviews: 50,
            prefer_new: 1.0,
            prefer_used: 0.0,
            body_sedan: 1,
            body_suv: 0,
        }
    }

    #[test]
    fn scenario_a_features() {
        let v = build_feature_vector(&scenario_a()).unwrap();
        assert_eq!(v.len(), FEATURE_COUNT);

        let x = v.as_slice();
        assert!((x[0] - 0.25).abs() < 1e-12);
        assert!((x[1] - (-5.0 / 35.0)).abs() < 1e-12);
        assert!((x[1] - (-0.1429)).abs() < 1e-4);
        assert!((x[2] - 0.9).abs() < 1e-12);
        assert!((x[3] - 0.8).abs() < 1e-12);
        assert!((x[4] - 51f64.ln()).abs() < 1e-12);
        assert!((x[4] - 3.9318).abs() < 1e-4);
        assert_eq!(&x[5..], &[1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn named_lookup_follows_schema_order() {
        let v = build_feature_vector(&scenario_a()).unwrap();
        assert_eq!(v.get("price_gap"), Some(v.as_slice()[0]));
        assert_eq!(v.get("body_sedan"), Some(1.0));
        assert_eq!(v.get("trim_level"), None);
    }

    #[test]
    fn builder_is_bit_for_bit_deterministic() {
        let req = scenario_a();
        let a = build_feature_vector(&req).unwrap();
        let b = build_feature_vector(&req).unwrap();
        let bits = |v: &FeatureVector| v.as_slice().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn zero_budget_uses_floor() {
        let mut req = scenario_a();
        req.user_budget = 0.0;
        let v = build_feature_vector(&req).unwrap();
        let price_gap = v.as_slice()[0];
        assert!(price_gap.is_finite());
        assert_eq!(price_gap, 25000.0);
    }

    #[test]
    fn zero_desired_mpg_uses_floor() {
        let mut req = scenario_a();
        req.desired_mpg = 0.0;
        let v = build_feature_vector(&req).unwrap();
        assert_eq!(v.as_slice()[1], 30.0);
    }

    #[test]
    fn zero_reviews_gives_zero_log_feature() {
        let mut req = scenario_a();
        req.num_reviews = 0;
        let v = build_feature_vector(&req).unwrap();
        assert_eq!(v.as_slice()[4], 0.0);
    }

    #[test]
    fn sentiment_endpoints_map_to_unit_interval() {
        let mut req = scenario_a();
        req.avg_sentiment = -1.0;
        assert_eq!(build_feature_vector(&req).unwrap().as_slice()[3], 0.0);
        req.avg_sentiment = 1.0;
        assert_eq!(build_feature_vector(&req).unwrap().as_slice()[3], 1.0);
    }

    #[test]
    fn invalid_request_produces_no_vector() {
        let mut req = scenario_a();
        req.prefer_used = -0.5;
        let err = build_feature_vector(&req).unwrap_err();
        assert!(matches!(err, MatchError::Validation { .. }));
    }
}
