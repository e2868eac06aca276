//! Temperature unit conversion for decoded Celsius readings into the
//! configured display unit.

/// Convert Celsius to Fahrenheit.
///
/// ```
/// use pitctl::utils::celsius_to_fahrenheit;
/// let fahrenheit = celsius_to_fahrenheit(100.0);
/// assert!((fahrenheit - 212.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius.
///
/// ```
/// use pitctl::utils::fahrenheit_to_celsius;
/// let celsius = fahrenheit_to_celsius(212.0);
/// assert!((celsius - 100.0).abs() < 0.001);
/// ```
#[inline]
pub fn fahrenheit_to_celsius(fahrenheit: f32) -> f32 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_to_fahrenheit() {
        assert!((celsius_to_fahrenheit(0.0) - 32.0).abs() < 0.001);
        assert!((celsius_to_fahrenheit(100.0) - 212.0).abs() < 0.001);
        assert!((celsius_to_fahrenheit(-40.0) - (-40.0)).abs() < 0.001);
    }

    #[test]
    fn test_fahrenheit_to_celsius() {
        assert!((fahrenheit_to_celsius(32.0) - 0.0).abs() < 0.001);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 0.001);
        assert!((fahrenheit_to_celsius(-40.0) - (-40.0)).abs() < 0.001);
    }

    #[test]
    fn test_temperature_roundtrip() {
        let original = 63.5;
        let converted = fahrenheit_to_celsius(celsius_to_fahrenheit(original));
        assert!((converted - original).abs() < 0.001);
    }
}
