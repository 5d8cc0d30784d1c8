use crate::db::models::{DetectedObject, DetectionSummary};
use crate::error::Error;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

/// Derive the summary fields stored alongside a detection batch.
///
/// Class counts are reported in first-appearance order, e.g.
/// `"person (2), car (1)"`. An empty batch is a validation error.
pub fn summarize(objects: &[DetectedObject]) -> Result<DetectionSummary, Error> {
    if objects.is_empty() {
        return Err(Error::Validation(
            "objects must be a non-empty array".to_string(),
        ));
    }

    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut score_sum = Decimal::ZERO;

    for object in objects {
        let class = object.class();
        match index.get(class) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(class, counts.len());
                counts.push((class, 1));
            }
        }
        score_sum += to_decimal(object.score())?;
    }

    let total = objects.len();
    let mean = score_sum
        .checked_div(Decimal::from(total))
        .and_then(|mean| mean.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or_else(|| Error::Validation("scores are out of range".to_string()))?;
    let detected_objects = counts
        .iter()
        .map(|(class, count)| format!("{} ({})", class, count))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(DetectionSummary {
        total_objects: to_i32(total)?,
        unique_objects: to_i32(counts.len())?,
        avg_confidence: to_f64(round_decimal(mean))?,
        detected_objects,
    })
}

/// Round half away from zero to two decimal places.
///
/// Works on the shortest decimal form of `value`, so `1.005` becomes `1.01`
/// the same way Postgres rounds a `NUMERIC`.
pub fn round2(value: f64) -> f64 {
    to_decimal(value)
        .ok()
        .and_then(|d| round_decimal(d).to_f64())
        .unwrap_or(value)
}

fn round_decimal(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// `f64`'s Display is its shortest round-trip form, which is the value the
// client wrote.
fn to_decimal(value: f64) -> Result<Decimal, Error> {
    value
        .to_string()
        .parse::<Decimal>()
        .or_else(|_| Decimal::try_from(value))
        .map_err(|_| Error::Validation(format!("score {} is out of range", value)))
}

fn to_f64(value: Decimal) -> Result<f64, Error> {
    value
        .to_f64()
        .ok_or_else(|| Error::Internal(format!("cannot represent {} as f64", value)))
}

fn to_i32(n: usize) -> Result<i32, Error> {
    i32::try_from(n).map_err(|_| Error::Validation(format!("batch of {} objects is too large", n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(items: &[(&str, f64)]) -> Vec<DetectedObject> {
        items
            .iter()
            .map(|(class, score)| DetectedObject::new(*class, *score))
            .collect()
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = summarize(&[]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn average_confidence_is_a_percentage() {
        let summary = summarize(&objects(&[("a", 0.5), ("b", 0.9), ("c", 1.0)])).unwrap();
        assert_eq!(summary.avg_confidence, 80.0);
    }

    #[test]
    fn average_confidence_rounds_to_two_places() {
        let summary = summarize(&objects(&[("a", 0.12345), ("a", 0.5)])).unwrap();
        assert_eq!(summary.avg_confidence, 31.17);
    }

    #[test]
    fn midpoints_round_away_from_zero() {
        let summary = summarize(&objects(&[("a", 0.01005)])).unwrap();
        assert_eq!(summary.avg_confidence, 1.01);

        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(-1.005), -1.01);
        assert_eq!(round2(80.0), 80.0);
    }

    #[test]
    fn class_counts_follow_first_appearance() {
        let summary =
            summarize(&objects(&[("person", 0.9), ("car", 0.8), ("person", 0.7)])).unwrap();
        assert_eq!(summary.detected_objects, "person (2), car (1)");
        assert_eq!(summary.total_objects, 3);
        assert_eq!(summary.unique_objects, 2);
    }

    #[test]
    fn unique_never_exceeds_total() {
        let batches = [
            objects(&[("x", 0.1)]),
            objects(&[("x", 0.1), ("x", 0.2), ("x", 0.3)]),
            objects(&[("x", 0.1), ("y", 0.2), ("z", 0.3), ("y", 0.4)]),
        ];

        for batch in &batches {
            let summary = summarize(batch).unwrap();
            assert_eq!(summary.total_objects as usize, batch.len());
            assert!(summary.unique_objects <= summary.total_objects);
        }
    }

    #[test]
    fn single_object_summary() {
        let summary = summarize(&objects(&[("cat", 0.456)])).unwrap();
        assert_eq!(summary.detected_objects, "cat (1)");
        assert_eq!(summary.avg_confidence, 45.6);
    }
}
