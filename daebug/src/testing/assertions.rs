//! Wire-protocol assertion helpers for testing the HTTP dispatcher.

use axum_test::TestResponse;

/// Assert a poll response carries `x-job-id` with the expected value.
///
/// # Panics
///
/// Panics if the header is missing or has a different value.
pub fn assert_job_id(response: &TestResponse, expected_id: u64) {
    let header = response
        .headers()
        .get("x-job-id")
        .expect("x-job-id header not found");
    let actual = header.to_str().expect("invalid x-job-id header value");
    assert_eq!(
        actual,
        expected_id.to_string(),
        "expected x-job-id {expected_id}, got {actual}"
    );
}

/// Assert a poll response has no job attached: 200 with an empty body and no
/// `x-job-id` header.
///
/// # Panics
///
/// Panics if a job id is present or the body is non-empty.
pub fn assert_empty_poll(response: &TestResponse) {
    response.assert_status_ok();
    assert!(
        response.headers().get("x-job-id").is_none(),
        "expected no x-job-id on an empty poll"
    );
    assert!(
        response.as_bytes().is_empty(),
        "expected empty body on an empty poll"
    );
}

/// Assert a page file on disk ends with the canonical footer.
///
/// # Panics
///
/// Panics if the file cannot be read or does not end with the footer.
pub fn assert_ends_with_footer(path: &std::path::Path) {
    let content = std::fs::read_to_string(path).expect("page file should be readable");
    assert!(
        content.ends_with(&crate::codec::canonical_footer()),
        "expected {} to end with the canonical footer",
        path.display()
    );
}
