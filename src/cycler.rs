//! Circular index stepping for device and codec selection.

use crate::errors::SessionError;

/// Next index in a circular list of `size` entries.
///
/// Ascending steps to `current + 1`, wrapping to `0` past the end; descending
/// steps to `current - 1`, wrapping to `size - 1` before the start.
///
/// # Errors
/// `InvalidArgument` when `size == 0` or `current >= size`.
pub fn next_index(size: usize, current: usize, ascending: bool) -> Result<usize, SessionError> {
    if size == 0 {
        return Err(SessionError::InvalidArgument(
            "cannot cycle through an empty list".to_string(),
        ));
    }
    if current >= size {
        return Err(SessionError::InvalidArgument(format!(
            "index {} is outside a list of size {}",
            current, size
        )));
    }

    let next = if ascending {
        if current + 1 == size {
            0
        } else {
            current + 1
        }
    } else if current == 0 {
        size - 1
    } else {
        current - 1
    };

    log::debug!(
        "Next index: {} Now: {} (size {}, ascending {})",
        next,
        current,
        size,
        ascending
    );
    Ok(next)
}
