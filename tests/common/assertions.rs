//! Custom assertion utilities for tests.

/// Assert that a result is Ok and return the inner value.
///
/// Provides a better error message than `.unwrap()` by including context.
#[allow(dead_code)]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("{} failed: {:?}", context, e),
    }
}

/// Assert that an error message, including its context chain, contains
/// `expected_text` (case-insensitive).
#[allow(dead_code)]
pub fn assert_error_contains(error: &anyhow::Error, expected_text: &str, context: &str) {
    let error_str = format!("{:#}", error).to_lowercase();
    assert!(
        error_str.contains(&expected_text.to_lowercase()),
        "{}: error message should contain '{}', got: {:#}",
        context,
        expected_text,
        error
    );
}
