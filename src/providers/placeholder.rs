// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Closed-form body composition estimators.

use super::{ProviderError, ScanProvider};
use crate::models::{BodyFatMethod, ScanInput, ScanMetrics, Sex};
use async_trait::async_trait;

/// Age assumed by the Deurenberg fallback when the user gave none.
pub const DEFAULT_AGE: u32 = 30;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// BMI from imperial units, 2 decimals.
pub fn bmi(weight_lb: f64, height_in: f64) -> Option<f64> {
    if weight_lb <= 0.0 || height_in <= 0.0 {
        return None;
    }
    Some(round_to(weight_lb / (height_in * height_in) * 703.0, 2))
}

/// US Navy circumference method. `None` unless every log argument is positive.
pub fn navy_body_fat(
    sex: Sex,
    height_in: f64,
    waist_in: f64,
    neck_in: f64,
    hip_in: Option<f64>,
) -> Option<f64> {
    if height_in <= 0.0 {
        return None;
    }
    let pct = match sex {
        Sex::Male => {
            let girth = waist_in - neck_in;
            if girth <= 0.0 {
                return None;
            }
            86.010 * girth.log10() - 70.041 * height_in.log10() + 36.76
        }
        Sex::Female => {
            let girth = waist_in + hip_in? - neck_in;
            if girth <= 0.0 {
                return None;
            }
            163.205 * girth.log10() - 97.684 * height_in.log10() - 78.387
        }
    };
    pct.is_finite().then(|| round_to(pct, 1))
}

/// Deurenberg BMI/age/sex regression.
pub fn deurenberg_body_fat(bmi: f64, age: Option<u32>, sex: Option<Sex>) -> f64 {
    let age = f64::from(age.unwrap_or(DEFAULT_AGE));
    let sex_flag = if sex == Some(Sex::Male) { 1.0 } else { 0.0 };
    round_to(1.2 * bmi + 0.23 * age - 10.8 * sex_flag - 5.4, 1)
}

/// Estimate metrics from measurements alone.
pub fn estimate(input: &ScanInput, provider: &str) -> ScanMetrics {
    let bmi = match (input.weight_lb, input.height_in) {
        (Some(w), Some(h)) => bmi(w, h),
        _ => None,
    };

    let navy = match (input.sex, input.height_in, input.waist_in, input.neck_in) {
        (Some(sex), Some(h), Some(waist), Some(neck)) => {
            navy_body_fat(sex, h, waist, neck, input.hip_in)
        }
        _ => None,
    };

    let (body_fat_pct, method) = match (navy, bmi) {
        (Some(pct), _) => (Some(pct), Some(BodyFatMethod::Navy)),
        (None, Some(bmi)) => (
            Some(deurenberg_body_fat(bmi, input.age, input.sex)),
            Some(BodyFatMethod::Deurenberg),
        ),
        (None, None) => (None, None),
    };

    ScanMetrics {
        bmi,
        body_fat_pct,
        method,
        provider: provider.to_string(),
        placeholder: true,
    }
}

/// Formula-only provider. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderProvider;

#[async_trait]
impl ScanProvider for PlaceholderProvider {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn analyze(&self, input: &ScanInput) -> Result<ScanMetrics, ProviderError> {
        Ok(estimate(input, self.name()))
    }
}
