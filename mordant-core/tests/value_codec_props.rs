use std::sync::Arc;

use mordant_core::{
    BuiltInCodec, CodecError, Decimal64, EnumPair, EnumerationCodec, IntType, Scalar, UnionCodec,
    Value, ValueCodec,
};
use proptest::prelude::*;

fn members() -> Vec<EnumPair> {
    ["red", "green", "blue"]
        .into_iter()
        .zip(0..)
        .map(|(name, value)| EnumPair {
            name: name.to_string(),
            value,
        })
        .collect()
}

#[test]
fn empty_accepts_only_empty() {
    let codec = BuiltInCodec::Empty;
    assert_eq!(codec.serialize(&Scalar::Empty).unwrap(), Value::Empty);
    assert!(matches!(
        codec.serialize(&Scalar::Bool(true)),
        Err(CodecError::InvalidValue(_))
    ));
}

proptest! {
    #[test]
    fn int_range_is_enforced(value: u8, min in 0u8..100, span in 0u8..100) {
        let max = min.saturating_add(span);
        let codec = BuiltInCodec::Int {
            ty: IntType::U8,
            range: Some((min as i128, max as i128)),
        };
        let result = codec.serialize(&Scalar::from(value));
        if (min..=max).contains(&value) {
            prop_assert_eq!(result.unwrap(), Value::from(value));
            prop_assert_eq!(codec.deserialize(&Value::from(value)).unwrap(), Scalar::from(value));
        } else {
            prop_assert!(matches!(result, Err(CodecError::InvalidValue(_))));
        }
    }

    #[test]
    fn int_width_must_match(value: u16) {
        let codec = BuiltInCodec::Int { ty: IntType::U32, range: None };
        prop_assert!(codec.serialize(&Scalar::from(value)).is_err());
        prop_assert!(codec.serialize(&Scalar::from(value as u32)).is_ok());
    }

    #[test]
    fn string_length_counts_characters(text in "\\PC{0,12}") {
        let codec = BuiltInCodec::String { length: Some((2, 6)) };
        let chars = text.chars().count();
        let result = codec.serialize(&Scalar::from(text.as_str()));
        prop_assert_eq!(result.is_ok(), (2..=6).contains(&chars));
    }

    #[test]
    fn decimal_digits_must_match(unscaled: i64, digits in 1u8..18) {
        let codec = BuiltInCodec::Decimal64 { fraction_digits: digits };
        let value = Decimal64::new(unscaled, digits);
        prop_assert!(codec.serialize(&Scalar::from(value)).is_ok());
        let other = Decimal64::new(unscaled, digits + 1);
        prop_assert!(codec.deserialize(&Value::Decimal(other)).is_err());
    }

    #[test]
    fn enumeration_accepts_members_only(name in "[a-z]{1,6}") {
        let codec = EnumerationCodec::new(members());
        let known = members().into_iter().any(|pair| pair.name == name);
        prop_assert_eq!(codec.deserialize(&Value::String(name.clone())).is_ok(), known);
    }

    #[test]
    fn union_prefers_earlier_members(name in "[a-z]{1,6}") {
        let codec = UnionCodec::new(vec![
            Arc::new(EnumerationCodec::new(members())) as Arc<dyn ValueCodec>,
            Arc::new(BuiltInCodec::String { length: None }),
        ]);
        let decoded = codec.deserialize(&Value::String(name.clone())).unwrap();
        let known = members().into_iter().any(|pair| pair.name == name);
        prop_assert_eq!(matches!(decoded, Scalar::Enum(_)), known);
        prop_assert_eq!(codec.serialize(&decoded).unwrap(), Value::String(name));
    }
}
