//! Deterministic content addresses for generated reports.
//!
//! A fingerprint is `"{report_type}_{hash}"`, where `hash` is a 32-bit rolling
//! hash of the canonical form input rendered in base 36. The hash only has to
//! avoid regenerating identical reports; it is not collision resistant against
//! an adversary. The type prefix keeps different report types apart even when
//! their hashes collide.

use crate::model::{FormInput, FormValue, ReportType};

/// Compute the fingerprint of a report request.
pub fn fingerprint(report_type: ReportType, input: &FormInput) -> String {
    format!("{}_{}", report_type.as_str(), hash_base36(&canonicalize(input)))
}

/// Render the input as a JSON object with lexicographically sorted keys.
///
/// Absent fields are skipped, so a field set to [`FormValue::Absent`] and a
/// missing key are indistinguishable.
pub fn canonicalize(input: &FormInput) -> String {
    let mut out = String::from("{");
    let present = input
        .iter()
        .filter(|(_, value)| !matches!(value, FormValue::Absent));
    for (i, (key, value)) in present.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote(key));
        out.push(':');
        out.push_str(&canonical_value(value));
    }
    out.push('}');
    out
}

fn canonical_value(value: &FormValue) -> String {
    match value {
        FormValue::Bool(b) => b.to_string(),
        FormValue::Number(n) => canonical_number(*n),
        FormValue::Text(s) => quote(s),
        FormValue::Absent => "null".to_string(),
    }
}

fn canonical_number(n: f64) -> String {
    if !n.is_finite() {
        // JSON has no NaN/Infinity; they serialize as null.
        return "null".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        // Integral values print without a trailing ".0".
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn quote(s: &str) -> String {
    // Serializing a &str cannot fail.
    serde_json::to_string(s).unwrap_or_default()
}

/// Rolling `h * 31 + c` over UTF-16 code units, wrapping at 32 bits.
pub fn rolling_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, c| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(c))
    })
}

/// The absolute value of [`rolling_hash`] in lowercase base 36.
pub fn hash_base36(s: &str) -> String {
    to_base36(i64::from(rolling_hash(s)).unsigned_abs())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn birth_form() -> FormInput {
        FormInput::new()
            .with("name", "Asha")
            .with("date", "1990-08-15")
            .with("time", "06:30")
            .with("place", "Pune")
    }

    #[test]
    fn test_canonical_form_sorts_keys() {
        let input = FormInput::new().with("b", 2).with("a", "x").with("c", true);
        assert_eq!(canonicalize(&input), r#"{"a":"x","b":2,"c":true}"#);
    }

    #[test]
    fn test_absent_matches_missing_key() {
        let absent = FormInput::new()
            .with("name", "Asha")
            .with("place", FormValue::Absent);
        let missing = FormInput::new().with("name", "Asha");
        assert_eq!(canonicalize(&absent), r#"{"name":"Asha"}"#);
        assert_eq!(
            fingerprint(ReportType::Kundali, &absent),
            fingerprint(ReportType::Kundali, &missing)
        );

        let unset: Option<&str> = None;
        let from_option = FormInput::new().with("name", "Asha").with("place", unset);
        assert_eq!(
            fingerprint(ReportType::Kundali, &from_option),
            fingerprint(ReportType::Kundali, &missing)
        );
    }

    #[test]
    fn test_absent_differs_from_empty_string() {
        let absent = FormInput::new().with("place", FormValue::Absent);
        let empty = FormInput::new().with("place", "");
        assert_ne!(canonicalize(&absent), canonicalize(&empty));
    }

    #[test]
    fn test_fingerprint_is_namespaced_by_type() {
        let input = birth_form();
        let kundali = fingerprint(ReportType::Kundali, &input);
        let tarot = fingerprint(ReportType::Tarot, &input);
        assert!(kundali.starts_with("kundali_"));
        assert!(tarot.starts_with("tarot_"));
        assert_eq!(kundali["kundali_".len()..], tarot["tarot_".len()..]);
    }

    #[test]
    fn test_rolling_hash_known_values() {
        assert_eq!(rolling_hash(""), 0);
        assert_eq!(rolling_hash("a"), 97);
        // 97 * 31 + 98
        assert_eq!(rolling_hash("ab"), 3105);
        assert_eq!(hash_base36("ab"), "2e9");
    }

    #[test]
    fn test_hash_base36_handles_min_value() {
        assert_eq!(to_base36(i64::from(i32::MIN).unsigned_abs()), "zik0zk");
    }

    #[test]
    fn test_integral_numbers_render_without_fraction() {
        assert_eq!(canonical_number(1990.0), "1990");
        assert_eq!(canonical_number(-3.0), "-3");
        assert_eq!(canonical_number(2.5), "2.5");
        assert_eq!(canonical_number(f64::NAN), "null");
    }

    fn arb_value() -> impl Strategy<Value = FormValue> {
        prop_oneof![
            any::<bool>().prop_map(FormValue::Bool),
            (-1_000_000i64..1_000_000).prop_map(FormValue::from),
            "[a-zA-Z0-9 :/-]{1,16}".prop_map(FormValue::Text),
        ]
    }

    fn arb_fields() -> impl Strategy<Value = Vec<(String, FormValue)>> {
        prop::collection::btree_map("[a-z]{1,8}", arb_value(), 1..8)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_fingerprint_ignores_field_order(fields in arb_fields()) {
            let forward: FormInput = fields.iter().cloned().collect();
            let reversed: FormInput = fields.iter().rev().cloned().collect();
            prop_assert_eq!(
                fingerprint(ReportType::Horoscope, &forward),
                fingerprint(ReportType::Horoscope, &reversed)
            );
        }

        #[test]
        fn prop_fingerprint_changes_when_a_field_changes(
            fields in arb_fields(),
            pick in any::<prop::sample::Index>(),
            suffix in "[a-z0-9]{1,6}",
        ) {
            let original: FormInput = fields.iter().cloned().collect();
            let (key, value) = &fields[pick.index(fields.len())];
            let mutated_value = match value {
                FormValue::Bool(b) => FormValue::Bool(!b),
                FormValue::Number(n) => FormValue::Number(n + 1.0),
                FormValue::Text(s) => FormValue::Text(format!("{s}{suffix}")),
                FormValue::Absent => FormValue::Text(suffix.clone()),
            };
            let mutated = original.clone().with(key.clone(), mutated_value);
            prop_assert_ne!(
                fingerprint(ReportType::Horoscope, &original),
                fingerprint(ReportType::Horoscope, &mutated)
            );
        }
    }
}
