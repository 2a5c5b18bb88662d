//! Small validators shared by profile loading.
use std::collections::HashSet;
use std::hash::Hash;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Longest interval, timeout or run duration accepted from a profile or the CLI.
pub const MAX_SECONDS: f64 = 10.0 * 365.0 * 24.0 * 3600.0;

/// Converts seconds into a non-zero [`Duration`] that is safe to add to an `Instant`.
///
/// # Arguments
///
/// * `seconds` - The value to convert.
///
/// # Returns
///
/// * `Ok(Duration)` if the value is finite, at most [`MAX_SECONDS`], and does not round
///   down to zero nanoseconds.
/// * `Err(&'static str)` otherwise.
pub fn seconds_to_duration(seconds: f64) -> Result<Duration, &'static str> {
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err("Value must be a positive, finite number of seconds");
    }
    if seconds > MAX_SECONDS {
        return Err("Value exceeds the ten year limit");
    }
    match Duration::try_from_secs_f64(seconds) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err("Value is shorter than one nanosecond"),
    }
}

/// Validates that a duration expressed in seconds is usable as a poll interval
/// or a timeout. See [`seconds_to_duration`].
pub fn is_positive_seconds(seconds: f64) -> Result<(), &'static str> {
    seconds_to_duration(seconds).map(|_| ())
}

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Returns the first item that appears more than once, if any.
pub fn first_duplicate<'a, T, I>(items: I) -> Option<&'a T>
where
    T: Eq + Hash + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut seen = HashSet::new();
    items.into_iter().find(|item| !seen.insert(*item))
}
