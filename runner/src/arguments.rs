use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single positional argument handed to a subjob
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Booleans are written as `True`/`False`, whole floats as `2.0` and very small or
/// large floats as `1e-07`.
impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write_float(f, *value),
            Self::Str(value) => f.write_str(value),
        }
    }
}

/// shortest round-tripping digits, scientific below 1e-4 and from 1e16 on
fn write_float(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_nan() {
        return f.write_str("nan");
    }
    if value.is_infinite() {
        return f.write_str(if value < 0.0 { "-inf" } else { "inf" });
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let scientific = format!("{value:e}");
        if let Some((mantissa, exponent)) = scientific.split_once('e') {
            if let Ok(exponent) = exponent.parse::<i32>() {
                let sign = if exponent < 0 { '-' } else { '+' };

                return write!(f, "{mantissa}e{sign}{:02}", exponent.abs());
            }
        }
    }

    if value.fract() == 0.0 {
        write!(f, "{value:.1}")
    } else {
        write!(f, "{value}")
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered positional arguments of one subjob
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
#[serde(transparent)]
pub struct ArgumentTuple(Vec<ArgValue>);

impl ArgumentTuple {
    pub fn new(values: Vec<ArgValue>) -> Self {
        Self(values)
    }

    /// stringified values, in order, ready to be passed as argv entries
    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect_vec()
    }
}

impl fmt::Display for ArgumentTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.iter().join(" "))
    }
}

impl<T: Into<ArgValue>> FromIterator<T> for ArgumentTuple {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Cartesian product over the given axes, the first axis varies slowest.
///
/// `[[a, b], [1, 2]]` expands to `(a 1) (a 2) (b 1) (b 2)`. No axes, or any
/// empty axis, yields no tuples at all.
pub fn expand_product(axes: &[Vec<ArgValue>]) -> Vec<ArgumentTuple> {
    if axes.is_empty() || axes.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    axes.iter()
        .map(|axis| axis.iter().cloned())
        .multi_cartesian_product()
        .map(ArgumentTuple::new)
        .collect_vec()
}

/// Where the tuples of a job come from: explicit tuples first, followed by the
/// expansion of `product`
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ArgumentSource {
    #[serde(default)]
    pub tuples: Vec<ArgumentTuple>,
    #[serde(default)]
    pub product: Vec<Vec<ArgValue>>,
}

impl ArgumentSource {
    pub fn collect(&self) -> Vec<ArgumentTuple> {
        let mut tuples = self.tuples.clone();
        tuples.extend(expand_product(&self.product));

        tuples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_scalars() {
        let tuple = ArgumentTuple::new(vec![
            "a b".into(),
            1i64.into(),
            0.25f64.into(),
            2.0f64.into(),
            true.into(),
        ]);

        assert_eq!(tuple.to_args(), vec!["a b", "1", "0.25", "2.0", "True"]);
        assert_eq!(tuple.to_string(), "a b 1 0.25 2.0 True");
        assert_eq!(ArgValue::from(false).to_string(), "False");
    }

    #[test]
    fn floats_switch_to_exponent_notation() {
        let cases = [
            (1e-7, "1e-07"),
            (-2.5e-5, "-2.5e-05"),
            (0.0001, "0.0001"),
            (1e15, "1000000000000000.0"),
            (1e16, "1e+16"),
            (1.5e300, "1.5e+300"),
            (0.0, "0.0"),
            (f64::INFINITY, "inf"),
            (f64::NEG_INFINITY, "-inf"),
            (f64::NAN, "nan"),
        ];

        for (value, expected) in cases {
            assert_eq!(ArgValue::from(value).to_string(), expected);
        }
    }

    #[test]
    fn yaml_scalars_keep_their_type() {
        let tuple: ArgumentTuple = serde_yaml::from_str("[yes, true, 1.0e-7, '1e-7', 3]").unwrap();

        assert_eq!(tuple.to_args(), vec!["yes", "True", "1e-07", "1e-7", "3"]);
    }

    #[test]
    fn product_first_axis_slowest() {
        let axes = vec![
            vec![ArgValue::from("a"), ArgValue::from("b")],
            vec![ArgValue::from(1i64), ArgValue::from(2i64), ArgValue::from(3i64)],
        ];
        let expanded = expand_product(&axes)
            .iter()
            .map(ToString::to_string)
            .collect_vec();

        assert_eq!(expanded, vec!["a 1", "a 2", "a 3", "b 1", "b 2", "b 3"]);
    }

    #[test]
    fn product_without_axes_is_empty() {
        assert!(expand_product(&[]).is_empty());
        assert!(expand_product(&[vec![ArgValue::from(1i64)], vec![]]).is_empty());
    }

    #[test]
    fn source_keeps_explicit_tuples_first() {
        let source: ArgumentSource =
            serde_yaml::from_str("tuples: [[x, 0]]\nproduct: [[1, 2]]").unwrap();
        let tuples = source.collect().iter().map(ToString::to_string).collect_vec();

        assert_eq!(tuples, vec!["x 0", "1", "2"]);
    }

    #[test]
    fn nested_values_are_rejected() {
        let parsed = serde_yaml::from_str::<ArgumentSource>("tuples: [[a, [1, 2]]]");

        assert!(parsed.is_err());
    }
}
