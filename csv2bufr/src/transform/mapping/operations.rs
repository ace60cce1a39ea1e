//! Value operations applied after resolution: QC bounds and scale/offset.
//!
//! Both are pure and leave missing or non-numeric values untouched.

use crate::models::{ElementValue, Scalar};

/// Outcome of a bounds check.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundsCheck {
    /// Value kept (in range, non-numeric, or missing).
    Kept(ElementValue),
    /// Numeric value outside `[min, max]`, replaced by missing.
    Rejected { value: f64 },
}

impl BoundsCheck {
    pub fn into_value(self) -> ElementValue {
        match self {
            BoundsCheck::Kept(v) => v,
            BoundsCheck::Rejected { .. } => ElementValue::Missing,
        }
    }
}

/// Check a value against inclusive bounds. Either bound may be absent.
pub fn check_bounds(value: ElementValue, min: Option<f64>, max: Option<f64>) -> BoundsCheck {
    let Some(v) = value.as_scalar().and_then(Scalar::as_f64) else {
        return BoundsCheck::Kept(value);
    };

    let below = min.map_or(false, |m| v < m);
    let above = max.map_or(false, |m| v > m);
    if below || above {
        BoundsCheck::Rejected { value: v }
    } else {
        BoundsCheck::Kept(value)
    }
}

/// Apply inclusive bounds. Out of range numeric values become missing.
pub fn apply_bounds(value: ElementValue, min: Option<f64>, max: Option<f64>) -> ElementValue {
    check_bounds(value, min, max).into_value()
}

/// `value * 10^scale + offset`.
///
/// Integer inputs stay integer when the scale is a non-negative integer, the
/// offset is an integer and nothing overflows. Everything else is a float.
pub fn apply_scale_offset(value: Scalar, scale: &Scalar, offset: &Scalar) -> Scalar {
    let Some(v) = value.as_f64() else {
        return value;
    };
    let (Some(s), Some(o)) = (scale.as_f64(), offset.as_f64()) else {
        return value;
    };

    if let (Scalar::Integer(i), Some(exp), Scalar::Integer(off)) = (&value, integral_exponent(scale), offset) {
        let exact = 10i64
            .checked_pow(exp)
            .and_then(|factor| i.checked_mul(factor))
            .and_then(|scaled| scaled.checked_add(*off));
        if let Some(result) = exact {
            return Scalar::Integer(result);
        }
    }

    let factor = if s.fract() == 0.0 && s.abs() <= i32::MAX as f64 {
        10f64.powi(s as i32)
    } else {
        10f64.powf(s)
    };
    Scalar::Float(v * factor + o)
}

fn integral_exponent(scale: &Scalar) -> Option<u32> {
    match scale {
        Scalar::Integer(s) => u32::try_from(*s).ok(),
        Scalar::Float(s) if s.fract() == 0.0 && *s >= 0.0 && *s <= u32::MAX as f64 => Some(*s as u32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(f: f64) -> ElementValue {
        ElementValue::Present(Scalar::Float(f))
    }

    #[test]
    fn test_bounds_inclusive() {
        assert_eq!(apply_bounds(num(-90.0), Some(-90.0), Some(90.0)), num(-90.0));
        assert_eq!(apply_bounds(num(90.0), Some(-90.0), Some(90.0)), num(90.0));
        assert!(apply_bounds(num(90.1), Some(-90.0), Some(90.0)).is_missing());
        assert!(apply_bounds(num(-90.1), Some(-90.0), Some(90.0)).is_missing());
    }

    #[test]
    fn test_bounds_one_sided() {
        assert_eq!(apply_bounds(num(1e6), Some(0.0), None), num(1e6));
        assert!(apply_bounds(num(-1.0), Some(0.0), None).is_missing());
        assert!(apply_bounds(num(101.0), None, Some(100.0)).is_missing());
    }

    #[test]
    fn test_bounds_pass_through() {
        let text = ElementValue::Present(Scalar::Text("AWS".into()));
        assert_eq!(apply_bounds(text.clone(), Some(0.0), Some(1.0)), text);
        assert!(apply_bounds(ElementValue::Missing, Some(0.0), Some(1.0)).is_missing());
    }

    #[test]
    fn test_check_bounds_reports_rejected_value() {
        let check = check_bounds(ElementValue::Present(Scalar::Integer(13)), Some(1.0), Some(12.0));
        assert_eq!(check, BoundsCheck::Rejected { value: 13.0 });
    }

    #[test]
    fn test_scale_offset_kelvin() {
        let result = apply_scale_offset(Scalar::Float(20.0), &Scalar::Integer(0), &Scalar::Float(273.15));
        match result {
            Scalar::Float(f) => assert!((f - 293.15).abs() < 1e-9),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_scale_offset_identity() {
        let result = apply_scale_offset(Scalar::Float(12.5), &Scalar::Integer(0), &Scalar::Integer(0));
        assert_eq!(result, Scalar::Float(12.5));
    }

    #[test]
    fn test_scale_offset_integer_preserved() {
        let result = apply_scale_offset(Scalar::Integer(1013), &Scalar::Integer(2), &Scalar::Integer(0));
        assert_eq!(result, Scalar::Integer(101300));
    }

    #[test]
    fn test_scale_offset_negative_scale_is_float() {
        let result = apply_scale_offset(Scalar::Integer(101325), &Scalar::Integer(-2), &Scalar::Integer(0));
        match result {
            Scalar::Float(f) => assert!((f - 1013.25).abs() < 1e-9),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_scale_offset_overflow_falls_back_to_float() {
        let result = apply_scale_offset(Scalar::Integer(i64::MAX), &Scalar::Integer(1), &Scalar::Integer(0));
        assert!(matches!(result, Scalar::Float(_)));
    }

    #[test]
    fn test_scale_offset_non_numeric_bypass() {
        let text = Scalar::Text("AWS".into());
        assert_eq!(apply_scale_offset(text.clone(), &Scalar::Integer(1), &Scalar::Integer(0)), text);
    }
}
