//! Nested-bracket rendering of flat row-major data.

use std::fmt::{Display, Write};

use crate::strides::shape_len;

/// Render `values` (row-major, `product(shape)` long) as a nested array.
///
/// ```text
/// shape [2, 3]  ->  [[0 1 2]
///                    [3 4 5]]
/// ```
///
/// A rank-0 shape renders the single value without brackets.
pub(crate) fn format_nested<T: Display>(values: &[T], shape: &[usize]) -> String {
    debug_assert_eq!(Some(values.len()), shape_len(shape));
    let mut out = String::new();
    if shape.is_empty() {
        if let Some(v) = values.first() {
            let _ = write!(out, "{v}");
        }
        return out;
    }
    write_level(&mut out, values, shape, 0);
    out
}

fn write_level<T: Display>(out: &mut String, values: &[T], shape: &[usize], depth: usize) {
    let Some((&dim, rest)) = shape.split_first() else {
        return;
    };
    out.push('[');
    if rest.is_empty() {
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{v}");
        }
    } else {
        let block = values.len() / dim.max(1);
        for i in 0..dim {
            if i > 0 {
                out.push('\n');
                out.extend(std::iter::repeat_n(' ', depth + 1));
            }
            write_level(out, &values[i * block..(i + 1) * block], rest, depth + 1);
        }
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_1d() {
        assert_eq!(format_nested(&[1, 2, 3], &[3]), "[1 2 3]");
    }

    #[test]
    fn test_format_2d() {
        let v: Vec<i32> = (0..6).collect();
        assert_eq!(format_nested(&v, &[2, 3]), "[[0 1 2]\n [3 4 5]]");
    }

    #[test]
    fn test_format_3d() {
        let v: Vec<i32> = (0..8).collect();
        assert_eq!(
            format_nested(&v, &[2, 2, 2]),
            "[[[0 1]\n  [2 3]]\n [[4 5]\n  [6 7]]]"
        );
    }

    #[test]
    fn test_format_scalar_and_empty() {
        assert_eq!(format_nested(&[4.5], &[]), "4.5");
        assert_eq!(format_nested::<i32>(&[], &[0]), "[]");
        assert_eq!(format_nested::<i32>(&[], &[0, 3]), "[]");
    }
}
