/// Greatest common divisor of `|a|` and `|b|`; `gcd(0, 0) = 0`.
pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a as i64
}

/// GCD of all values in the iterator.
pub fn gcd_all(values: impl IntoIterator<Item = i64>) -> i64 {
    values.into_iter().fold(0, gcd)
}

/// Division rounding towards negative infinity.
///
/// ```text
/// div_floor(7, 2) = 3
/// div_floor(-7, 2) = -4
/// ```
pub fn div_floor(a: i64, b: i64) -> i64 {
    assert_ne!(b, 0, "Division by zero");
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(0, 0), 0);
        assert_eq!(gcd(0, 5), 5);
        assert_eq!(gcd(12, -18), 6);
        assert_eq!(gcd(-7, 3), 1);
        assert_eq!(gcd_all([4, -6, 10]), 2);
        assert_eq!(gcd_all([]), 0);
    }

    #[test]
    fn test_div_floor() {
        assert_eq!(div_floor(7, 2), 3);
        assert_eq!(div_floor(-7, 2), -4);
        assert_eq!(div_floor(7, -2), -4);
        assert_eq!(div_floor(-7, -2), 3);
        assert_eq!(div_floor(-6, 3), -2);
        assert_eq!(div_floor(0, 3), 0);
    }
}
